use std::collections::BTreeSet;

use tracing::debug;

use cadence_model::{GroupMatcher, JobKey, TriggerKey, TriggerState, TriggerStatus};

use super::transaction::TxContext;
use crate::error::Result;
use crate::store::{RecordKind, TriggerRecord};

impl TxContext<'_> {
    pub(crate) fn trigger_status(&mut self, key: &TriggerKey) -> Result<TriggerStatus> {
        Ok(self
            .read_trigger(key)?
            .map_or(TriggerStatus::None, |record| record.state.status()))
    }

    pub(crate) fn pause_trigger(&mut self, key: &TriggerKey) -> Result<()> {
        debug!(trigger = %key, "pause trigger");
        if let Some(mut record) = self.read_trigger(key)? {
            self.pause_record(&mut record)?;
        }
        Ok(())
    }

    fn pause_record(&mut self, record: &mut TriggerRecord) -> Result<()> {
        match record.state.paused() {
            Some(paused) if paused != record.state => self.set_trigger_state(record, paused),
            _ => Ok(()),
        }
    }

    pub(crate) fn resume_trigger(&mut self, key: &TriggerKey) -> Result<()> {
        debug!(trigger = %key, "resume trigger");
        if let Some(mut record) = self.read_trigger(key)? {
            self.resume_record(&mut record)?;
        }
        Ok(())
    }

    fn resume_record(&mut self, record: &mut TriggerRecord) -> Result<()> {
        record.state = record.state.resumed();
        self.apply_misfire(record)?;
        self.save_trigger(record)
    }

    pub(crate) fn pause_job(&mut self, key: &JobKey) -> Result<()> {
        debug!(job = %key, "pause job");
        for mut record in self.triggers_of_job(key)? {
            self.pause_record(&mut record)?;
        }
        Ok(())
    }

    pub(crate) fn resume_job(&mut self, key: &JobKey) -> Result<()> {
        debug!(job = %key, "resume job");
        for mut record in self.triggers_of_job(key)? {
            self.resume_record(&mut record)?;
        }
        Ok(())
    }

    pub(crate) fn pause_jobs(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        debug!(?matcher, "pause jobs");
        let groups = self.job_groups_matching(matcher)?;
        for group in &groups {
            for key in self.job_keys(&GroupMatcher::group_equals(group.as_str()))? {
                self.pause_job(&key)?;
            }
        }
        Ok(groups)
    }

    pub(crate) fn resume_jobs(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        debug!(?matcher, "resume jobs");
        let groups = self.job_groups_matching(matcher)?;
        for group in &groups {
            for key in self.job_keys(&GroupMatcher::group_equals(group.as_str()))? {
                self.resume_job(&key)?;
            }
        }
        Ok(groups)
    }

    fn job_groups_matching(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        Ok(self
            .job_keys(matcher)?
            .into_iter()
            .map(|key| key.group)
            .collect())
    }

    fn trigger_groups_matching(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        Ok(self
            .trigger_keys(matcher)?
            .into_iter()
            .map(|key| key.group)
            .collect())
    }

    pub(crate) fn pause_triggers(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        debug!(?matcher, "pause triggers");
        let groups = self.trigger_groups_matching(matcher)?;
        for group in &groups {
            for mut record in self.triggers_in_group(group)? {
                self.pause_record(&mut record)?;
            }
        }
        Ok(groups)
    }

    pub(crate) fn resume_triggers(&mut self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        debug!(?matcher, "resume triggers");
        let groups = self.trigger_groups_matching(matcher)?;
        for group in &groups {
            for mut record in self.triggers_in_group(group)? {
                self.resume_record(&mut record)?;
            }
        }
        Ok(groups)
    }

    pub(crate) fn pause_all(&mut self) -> Result<()> {
        debug!("pause all");
        for mut record in self.all_triggers()? {
            self.pause_record(&mut record)?;
        }
        Ok(())
    }

    pub(crate) fn resume_all(&mut self) -> Result<()> {
        debug!("resume all");
        for mut record in self.all_triggers()? {
            self.resume_record(&mut record)?;
        }
        Ok(())
    }

    /// Groups in which every trigger is PAUSED or PAUSED_BLOCKED.
    pub(crate) fn paused_trigger_groups(&mut self) -> Result<BTreeSet<String>> {
        let mut paused = BTreeSet::new();
        for group in self.group_names(RecordKind::Trigger)? {
            let all_paused = self
                .triggers_in_group(&group)?
                .iter()
                .all(|record| record.state.is_paused());
            if all_paused {
                paused.insert(group);
            }
        }
        Ok(paused)
    }

    pub(crate) fn reset_trigger_from_error_state(&mut self, key: &TriggerKey) -> Result<()> {
        let Some(mut record) = self.read_trigger(key)? else {
            return Ok(());
        };
        if record.state != TriggerState::Error {
            return Ok(());
        }
        debug!(trigger = %key, "reset trigger from error state");
        self.set_trigger_state(&mut record, TriggerState::Waiting)
    }
}
