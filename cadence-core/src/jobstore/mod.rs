//! Job-store coordinator: the trigger state machine on top of a
//! [`crate::store::DocumentStore`].
//!
//! Every public operation takes the node-wide monitor, then runs inside one
//! store transaction that is retried on optimistic-concurrency conflicts.
//! Signals raised while the transaction is open are delivered only after it
//! commits, followed by one [`crate::events::SchedulerEvent`] per changed
//! job or trigger record.

mod acquire;
mod calendars;
mod coordinator;
mod fire;
mod jobs;
mod misfire;
mod pause;
mod transaction;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use cadence_model::{
    Calendar, CompletedExecutionInstruction, GroupMatcher, JobDetail, JobKey, Trigger,
    TriggerFiredBundle, TriggerKey, TriggerStatus,
};

use crate::error::{JobStoreError, Result};
use crate::signaler::SchedulerSignaler;

pub use coordinator::JobStoreCoordinator;

/// Result of firing one acquired trigger.
#[derive(Debug)]
pub enum TriggerFiredOutcome {
    Fired(Box<TriggerFiredBundle>),
    /// The trigger was deleted, released, or lost its calendar meanwhile.
    Skipped,
    Failed(JobStoreError),
}

impl TriggerFiredOutcome {
    pub fn bundle(&self) -> Option<&TriggerFiredBundle> {
        match self {
            TriggerFiredOutcome::Fired(bundle) => Some(bundle),
            _ => None,
        }
    }
}

/// Storage SPI consumed by the scheduler runtime.
#[async_trait]
pub trait JobStore: Send + Sync + fmt::Debug {
    // Lifecycle

    /// Installs the scheduler's signaler. May be called once.
    async fn initialize(&self, signaler: Arc<dyn SchedulerSignaler>) -> Result<()>;

    /// Recovers local triggers left in transient states by a previous run.
    async fn scheduler_started(&self) -> Result<()>;

    async fn scheduler_paused(&self);

    async fn scheduler_resumed(&self);

    async fn shutdown(&self);

    fn supports_persistence(&self) -> bool;

    fn is_clustered(&self) -> bool;

    fn estimated_time_to_release_and_acquire(&self) -> Duration;

    // Jobs

    async fn store_job(&self, job: JobDetail, replace: bool) -> Result<()>;

    async fn store_job_and_trigger(&self, job: JobDetail, trigger: Trigger) -> Result<()>;

    async fn store_jobs_and_triggers(
        &self,
        entries: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
    ) -> Result<()>;

    /// Deletes the job and all of its triggers.
    async fn remove_job(&self, key: &JobKey) -> Result<bool>;

    /// True only if every job existed.
    async fn remove_jobs(&self, keys: &[JobKey]) -> Result<bool>;

    async fn retrieve_job(&self, key: &JobKey) -> Result<Option<JobDetail>>;

    async fn check_job_exists(&self, key: &JobKey) -> Result<bool>;

    async fn number_of_jobs(&self) -> Result<usize>;

    async fn job_group_names(&self) -> Result<Vec<String>>;

    async fn job_keys(&self, matcher: &GroupMatcher) -> Result<Vec<JobKey>>;

    async fn pause_job(&self, key: &JobKey) -> Result<()>;

    async fn pause_jobs(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>>;

    async fn resume_job(&self, key: &JobKey) -> Result<()>;

    async fn resume_jobs(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>>;

    // Triggers

    async fn store_trigger(&self, trigger: Trigger, replace: bool) -> Result<()>;

    async fn remove_trigger(&self, key: &TriggerKey) -> Result<bool>;

    async fn remove_triggers(&self, keys: &[TriggerKey]) -> Result<bool>;

    /// True when an existing trigger was replaced, false when inserted as new.
    async fn replace_trigger(&self, old: &TriggerKey, new: Trigger) -> Result<bool>;

    async fn retrieve_trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>>;

    async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool>;

    async fn number_of_triggers(&self) -> Result<usize>;

    async fn trigger_group_names(&self) -> Result<Vec<String>>;

    async fn trigger_keys(&self, matcher: &GroupMatcher) -> Result<Vec<TriggerKey>>;

    async fn triggers_for_job(&self, key: &JobKey) -> Result<Vec<Trigger>>;

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerStatus>;

    /// Moves an ERROR trigger back to WAITING; no-op in any other state.
    async fn reset_trigger_from_error_state(&self, key: &TriggerKey) -> Result<()>;

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()>;

    async fn pause_triggers(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>>;

    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()>;

    async fn resume_triggers(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>>;

    async fn pause_all(&self) -> Result<()>;

    async fn resume_all(&self) -> Result<()>;

    async fn paused_trigger_groups(&self) -> Result<BTreeSet<String>>;

    // Firing

    /// Selects up to `max_count` local triggers due by
    /// `no_later_than + time_window` and marks them ACQUIRED.
    async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: TimeDelta,
    ) -> Result<Vec<Trigger>>;

    async fn release_acquired_trigger(&self, trigger: &Trigger) -> Result<()>;

    async fn triggers_fired(&self, triggers: &[Trigger]) -> Result<Vec<TriggerFiredOutcome>>;

    async fn triggered_job_complete(
        &self,
        trigger: &Trigger,
        job: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<()>;

    // Calendars

    async fn store_calendar(
        &self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()>;

    async fn remove_calendar(&self, name: &str) -> Result<bool>;

    async fn retrieve_calendar(&self, name: &str) -> Result<Option<Arc<dyn Calendar>>>;

    async fn number_of_calendars(&self) -> Result<usize>;

    async fn calendar_names(&self) -> Result<Vec<String>>;

    async fn clear_all_scheduling_data(&self) -> Result<()>;
}
