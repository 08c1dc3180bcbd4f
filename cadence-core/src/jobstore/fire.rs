use tracing::{debug, trace};

use cadence_model::{
    CompletedExecutionInstruction, JobDetail, JobKey, Trigger, TriggerFiredBundle, TriggerKey,
    TriggerState,
};

use super::TriggerFiredOutcome;
use super::transaction::TxContext;
use crate::error::{JobStoreError, Result};
use crate::signaler::PendingSignal;

impl TxContext<'_> {
    /// Fires each acquired trigger in turn.
    ///
    /// Store failures abort the whole attempt so it can be retried; a missing
    /// job only fails its own entry.
    pub(crate) fn triggers_fired(
        &mut self,
        triggers: &[Trigger],
    ) -> Result<Vec<TriggerFiredOutcome>> {
        let mut outcomes = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let outcome = match self.trigger_fired(&trigger.key) {
                Ok(Some(bundle)) => TriggerFiredOutcome::Fired(Box::new(bundle)),
                Ok(None) => TriggerFiredOutcome::Skipped,
                Err(err @ JobStoreError::Invariant(_)) => TriggerFiredOutcome::Failed(err),
                Err(err) => return Err(err),
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn trigger_fired(&mut self, key: &TriggerKey) -> Result<Option<TriggerFiredBundle>> {
        let Some(mut record) = self.read_trigger(key)? else {
            trace!(trigger = %key, "fired trigger no longer exists");
            return Ok(None);
        };
        if record.state != TriggerState::Acquired {
            trace!(trigger = %key, state = %record.state, "fired trigger is not acquired");
            return Ok(None);
        }

        let calendar = match &record.trigger.calendar_name {
            Some(name) => match self.find_calendar(name)? {
                Some(calendar) => Some(calendar),
                None => {
                    debug!(trigger = %key, calendar = %name, "calendar of fired trigger vanished");
                    return Ok(None);
                }
            },
            None => None,
        };

        let previous_fire_time = record.trigger.previous_fire_time;
        record.trigger.triggered(calendar.as_deref());
        self.set_trigger_state(&mut record, TriggerState::Waiting)?;

        let job = self.read_job(&record.trigger.job_key)?.ok_or_else(|| {
            JobStoreError::Invariant(format!(
                "job {} of fired trigger {} does not exist",
                record.trigger.job_key, key
            ))
        })?;

        if job.concurrent_execution_disallowed {
            self.block_siblings(&job.key, key)?;
        }

        debug!(
            trigger = %key,
            job = %job.key,
            next = ?record.trigger.next_fire_time,
            "trigger fired"
        );
        Ok(Some(TriggerFiredBundle {
            job,
            scheduled_fire_time: record.trigger.previous_fire_time,
            next_fire_time: record.trigger.next_fire_time,
            trigger: record.trigger,
            calendar,
            recovering: false,
            fire_time: self.now,
            previous_fire_time,
        }))
    }

    fn block_siblings(&mut self, job: &JobKey, fired: &TriggerKey) -> Result<()> {
        for mut sibling in self.triggers_of_job(job)? {
            if sibling.trigger.key == *fired {
                continue;
            }
            if let Some(blocked) = sibling.state.blocked() {
                self.set_trigger_state(&mut sibling, blocked)?;
            }
        }
        Ok(())
    }

    fn unblock_siblings(&mut self, job: &JobKey) -> Result<()> {
        for mut sibling in self.triggers_of_job(job)? {
            if let Some(unblocked) = sibling.state.unblocked() {
                self.set_trigger_state(&mut sibling, unblocked)?;
            }
        }
        Ok(())
    }

    pub(crate) fn triggered_job_complete(
        &mut self,
        trigger: &Trigger,
        job: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<()> {
        debug!(trigger = %trigger.key, job = %job.key, ?instruction, "triggered job complete");

        if job.persist_data_after_execution && self.job_exists(&job.key)? {
            self.update_job(job.clone())?;
        }

        if job.concurrent_execution_disallowed {
            self.unblock_siblings(&job.key)?;
            self.signal(PendingSignal::SchedulingChange(None));
        }

        let Some(mut stored) = self.read_trigger(&trigger.key)? else {
            return Ok(());
        };

        match instruction {
            CompletedExecutionInstruction::DeleteTrigger => {
                if trigger.next_fire_time.is_none() {
                    // Rescheduled since the firing was handed out; keep it.
                    if stored.trigger.next_fire_time.is_none() {
                        self.remove_trigger(&trigger.key)?;
                    }
                } else {
                    self.remove_trigger(&trigger.key)?;
                    self.signal(PendingSignal::SchedulingChange(None));
                }
            }
            CompletedExecutionInstruction::SetTriggerComplete => {
                self.set_trigger_state(&mut stored, TriggerState::Complete)?;
                self.signal(PendingSignal::SchedulingChange(None));
            }
            CompletedExecutionInstruction::SetTriggerError => {
                self.set_trigger_state(&mut stored, TriggerState::Error)?;
                self.signal(PendingSignal::SchedulingChange(None));
            }
            CompletedExecutionInstruction::SetAllJobTriggersComplete => {
                self.set_all_job_triggers(&trigger.job_key, TriggerState::Complete)?;
                self.signal(PendingSignal::SchedulingChange(None));
            }
            CompletedExecutionInstruction::SetAllJobTriggersError => {
                self.set_all_job_triggers(&trigger.job_key, TriggerState::Error)?;
                self.signal(PendingSignal::SchedulingChange(None));
            }
            CompletedExecutionInstruction::Noop | CompletedExecutionInstruction::ReExecuteJob => {}
        }
        Ok(())
    }

    fn set_all_job_triggers(&mut self, job: &JobKey, state: TriggerState) -> Result<()> {
        for mut record in self.triggers_of_job(job)? {
            self.set_trigger_state(&mut record, state)?;
        }
        Ok(())
    }
}
