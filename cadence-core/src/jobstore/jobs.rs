use tracing::debug;

use cadence_model::{GroupMatcher, JobDetail, JobKey, Trigger, TriggerKey, TriggerState};

use super::transaction::TxContext;
use crate::cluster::OWNER_NODE_KEY;
use crate::error::{JobStoreError, Result};
use crate::signaler::PendingSignal;
use crate::store::{RecordKind, TriggerRecord};

impl TxContext<'_> {
    pub(crate) fn store_job(&mut self, job: JobDetail, replace: bool) -> Result<()> {
        debug!(job = %job.key, replace, "store job");
        if !self.job_exists(&job.key)? {
            return self.insert_job(job);
        }
        if !replace {
            return Err(JobStoreError::already_exists(RecordKind::Job, &job.key));
        }
        self.update_job(job)
    }

    pub(crate) fn remove_job(&mut self, key: &JobKey) -> Result<bool> {
        debug!(job = %key, "remove job");
        let deleted = self.delete_job(key)?;
        for record in self.triggers_of_job(key)? {
            self.delete_trigger(&record.trigger.key)?;
        }
        Ok(deleted)
    }

    pub(crate) fn job_keys(&mut self, matcher: &GroupMatcher) -> Result<Vec<JobKey>> {
        let mut keys: Vec<JobKey> = self
            .jobs_matching(matcher)?
            .into_iter()
            .map(|job| job.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Stamps the owner key when clustered so the trigger is local here.
    fn claim(&self, trigger: &mut Trigger) {
        if self.locality.is_clustered() {
            trigger
                .data
                .insert(OWNER_NODE_KEY, self.locality.local_id());
        }
    }

    pub(crate) fn store_trigger(&mut self, mut trigger: Trigger, replace: bool) -> Result<()> {
        debug!(trigger = %trigger.key, replace, "store trigger");
        self.claim(&mut trigger);

        match self.read_trigger(&trigger.key)? {
            None => self.insert_trigger(trigger, TriggerState::Waiting),
            Some(_) if !replace => Err(JobStoreError::already_exists(
                RecordKind::Trigger,
                &trigger.key,
            )),
            Some(existing) => self.save_trigger(&TriggerRecord {
                trigger,
                state: existing.state,
            }),
        }
    }

    /// Deletes the trigger and, when it was the last one of a non-durable
    /// job, the job as well.
    pub(crate) fn remove_trigger(&mut self, key: &TriggerKey) -> Result<bool> {
        let Some(record) = self.read_trigger(key)? else {
            debug!(trigger = %key, "no matching trigger to remove");
            return Ok(false);
        };

        let job_key = record.trigger.job_key;
        let deleted = self.delete_trigger(key)?;
        debug!(trigger = %key, deleted, "trigger deleted");

        if deleted && self.triggers_of_job(&job_key)?.is_empty() {
            let orphaned = self
                .read_job(&job_key)?
                .is_some_and(|job| !job.durable);
            if orphaned && self.delete_job(&job_key)? {
                debug!(job = %job_key, "orphaned job deleted");
                self.signal(PendingSignal::JobDeleted(job_key));
            }
        }
        Ok(deleted)
    }

    pub(crate) fn replace_trigger(&mut self, old: &TriggerKey, mut new: Trigger) -> Result<bool> {
        debug!(old = %old, new = %new.key, "replace trigger");
        self.claim(&mut new);

        let Some(existing) = self.read_trigger(old)? else {
            if self.trigger_exists(&new.key)? {
                return Err(JobStoreError::already_exists(RecordKind::Trigger, &new.key));
            }
            self.insert_trigger(new, TriggerState::Waiting)?;
            return Ok(false);
        };

        if existing.trigger.job_key != new.job_key {
            return Err(JobStoreError::Validation(
                "New trigger is not related to the same job as the old trigger".into(),
            ));
        }

        if new.key == *old {
            self.save_trigger(&TriggerRecord {
                trigger: new,
                state: existing.state,
            })?;
        } else {
            if self.trigger_exists(&new.key)? {
                return Err(JobStoreError::already_exists(RecordKind::Trigger, &new.key));
            }
            self.delete_trigger(old)?;
            self.insert_trigger(new, existing.state)?;
        }
        Ok(true)
    }

    pub(crate) fn trigger_keys(&mut self, matcher: &GroupMatcher) -> Result<Vec<TriggerKey>> {
        let mut keys: Vec<TriggerKey> = self
            .triggers_matching(matcher)?
            .into_iter()
            .map(|record| record.trigger.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub(crate) fn clear_all(&mut self) -> Result<()> {
        let jobs = self.delete_all(RecordKind::Job)?;
        let triggers = self.delete_all(RecordKind::Trigger)?;
        let calendars = self.delete_all(RecordKind::Calendar)?;
        debug!(jobs, triggers, calendars, "cleared all scheduling data");
        Ok(())
    }
}
