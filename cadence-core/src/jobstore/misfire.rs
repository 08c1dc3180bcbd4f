use tracing::{debug, trace};

use cadence_model::{MisfireInstruction, TriggerState};

use super::transaction::TxContext;
use crate::error::Result;
use crate::signaler::PendingSignal;
use crate::store::TriggerRecord;

impl TxContext<'_> {
    /// Applies the misfire instruction when the trigger is overdue.
    ///
    /// Returns true when the trigger was rescheduled or finalized and must be
    /// left out of the current acquisition pass. A recomputation that leaves
    /// the next fire time unchanged reports false so the same trigger is not
    /// flagged again on every pass.
    pub(crate) fn apply_misfire(&mut self, record: &mut TriggerRecord) -> Result<bool> {
        trace!(trigger = %record.trigger.key, "checking for misfire");

        let Some(scheduled) = record.trigger.next_fire_time else {
            return Ok(false);
        };
        if scheduled > self.misfire_time()
            || record.trigger.misfire_instruction == MisfireInstruction::IgnoreMisfirePolicy
        {
            return Ok(false);
        }

        let calendar = self.calendar_of(&record.trigger)?;
        self.signal(PendingSignal::TriggerMisfired(record.trigger.clone()));
        record
            .trigger
            .update_after_misfire(calendar.as_deref(), self.now);

        match record.trigger.next_fire_time {
            None => {
                debug!(trigger = %record.trigger.key, "misfired trigger finalized");
                self.set_trigger_state(record, TriggerState::Complete)?;
                self.signal(PendingSignal::TriggerFinalized(record.trigger.clone()));
                Ok(true)
            }
            Some(next) if next == scheduled => Ok(false),
            Some(next) => {
                debug!(
                    trigger = %record.trigger.key,
                    %scheduled,
                    %next,
                    "misfired trigger rescheduled"
                );
                self.save_trigger(record)?;
                Ok(true)
            }
        }
    }

    /// Resets local triggers a crashed run left behind.
    pub(crate) fn recover_local_triggers(&mut self) -> Result<()> {
        let local: Vec<TriggerRecord> = self
            .all_triggers()?
            .into_iter()
            .filter(|record| self.locality.is_local(&record.trigger))
            .collect();

        for mut record in local {
            record.state = match record.state {
                TriggerState::Acquired | TriggerState::Blocked => TriggerState::Waiting,
                TriggerState::PausedBlocked => TriggerState::Paused,
                other => other,
            };

            if record.state == TriggerState::Complete {
                debug!(trigger = %record.trigger.key, "removing completed trigger");
                self.delete_trigger(&record.trigger.key)?;
            } else {
                self.apply_misfire(&mut record)?;
                self.save_trigger(&record)?;
            }
        }
        Ok(())
    }
}
