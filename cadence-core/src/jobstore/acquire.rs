use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use cadence_model::{JobKey, MisfireInstruction, Trigger, TriggerKey, TriggerState};

use super::transaction::TxContext;
use crate::cluster::{MissingLimitNode, OWNER_NODE_KEY};
use crate::error::Result;
use crate::store::TriggerRecord;

impl TxContext<'_> {
    pub(crate) fn acquire_next_triggers(
        &mut self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: TimeDelta,
    ) -> Result<Vec<Trigger>> {
        debug!(
            %no_later_than,
            max_count,
            time_window_ms = time_window.num_milliseconds(),
            "acquire next triggers"
        );

        let waiting: Vec<TriggerRecord> = self
            .triggers_in_state(TriggerState::Waiting)?
            .into_iter()
            .filter(|record| self.locality.is_local(&record.trigger))
            .collect();
        if waiting.is_empty() {
            return Ok(Vec::new());
        }

        let no_earlier_than = self.misfire_time();
        let horizon = no_later_than
            .checked_add_signed(time_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut candidates = Vec::with_capacity(waiting.len());

        for mut record in waiting {
            if record.trigger.next_fire_time.is_none() {
                continue;
            }
            if self.apply_misfire(&mut record)? {
                continue;
            }
            let Some(next) = record.trigger.next_fire_time else {
                continue;
            };
            if next > horizon {
                continue;
            }
            // Ignore-misfire triggers bypass only the lower bound.
            if record.trigger.misfire_instruction != MisfireInstruction::IgnoreMisfirePolicy
                && next < no_earlier_than
            {
                continue;
            }
            // Checked after misfire handling to avoid repeating the warning.
            if let Some(missing) = self.locality.missing_limit_node(&record.trigger) {
                warn_missing_limit_node(&record.trigger, &missing);
                continue;
            }
            candidates.push(record);
        }

        candidates.sort_by_key(|record| {
            (record.trigger.next_fire_time, Reverse(record.trigger.priority))
        });

        let mut exclusive: HashMap<JobKey, bool> = HashMap::new();
        let mut claimed_jobs: HashSet<JobKey> = HashSet::new();
        let mut batch = Vec::new();
        for record in candidates {
            let job_key = &record.trigger.job_key;
            let disallowed = match exclusive.get(job_key) {
                Some(disallowed) => *disallowed,
                None => {
                    let disallowed = self
                        .read_job(job_key)?
                        .is_some_and(|job| job.concurrent_execution_disallowed);
                    exclusive.insert(job_key.clone(), disallowed);
                    disallowed
                }
            };
            if disallowed && !claimed_jobs.insert(job_key.clone()) {
                trace!(
                    trigger = %record.trigger.key,
                    job = %job_key,
                    "job already acquired, skipping"
                );
                continue;
            }
            batch.push(record);
        }
        batch.truncate(max_count);

        let mut acquired = Vec::with_capacity(batch.len());
        for mut record in batch {
            record.trigger.fire_instance_id = Some(Uuid::now_v7().to_string());
            if self.locality.is_clustered() {
                record
                    .trigger
                    .data
                    .insert(OWNER_NODE_KEY, self.locality.local_id());
            }
            self.set_trigger_state(&mut record, TriggerState::Acquired)?;
            acquired.push(record.trigger);
        }

        trace!(count = acquired.len(), "acquired triggers");
        Ok(acquired)
    }

    pub(crate) fn release_acquired_trigger(&mut self, key: &TriggerKey) -> Result<()> {
        debug!(trigger = %key, "release acquired trigger");
        if let Some(mut record) = self.read_trigger(key)?
            && record.state == TriggerState::Acquired
        {
            self.set_trigger_state(&mut record, TriggerState::Waiting)?;
        }
        Ok(())
    }
}

fn warn_missing_limit_node(trigger: &Trigger, missing: &MissingLimitNode) {
    let description = trigger
        .description
        .as_deref()
        .filter(|description| !description.trim().is_empty())
        .unwrap_or(trigger.job_key.name());
    match missing {
        MissingLimitNode::NotConfiguredForHa => {
            warn!("Cannot run task '{}' because it is not configured for HA", description);
        }
        MissingLimitNode::NotAMember(node) => {
            warn!(
                "Cannot run task '{}' because it uses node {} which is not a member of this cluster",
                description, node
            );
        }
    }
}
