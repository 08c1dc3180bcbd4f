use std::fmt;

use chrono::{DateTime, Utc};

use cadence_model::{JobDetail, JobKey, Trigger, TriggerKey};

/// Narrow callback surface the store uses to reach the scheduler runtime.
///
/// Implementations must not call back into the job store synchronously.
pub trait SchedulerSignaler: Send + Sync + fmt::Debug {
    /// Wakes the scheduler loop. `None` asks for an immediate re-check;
    /// `Some(t)` hints that a trigger may now fire as early as `t`.
    fn signal_scheduling_change(&self, candidate: Option<DateTime<Utc>>);

    fn notify_job_added(&self, job: &JobDetail);

    fn notify_job_deleted(&self, key: &JobKey);

    fn notify_job_scheduled(&self, trigger: &Trigger);

    fn notify_job_unscheduled(&self, key: &TriggerKey);

    fn notify_trigger_misfired(&self, trigger: &Trigger);

    fn notify_trigger_finalized(&self, trigger: &Trigger);
}

/// Signaler used until the scheduler installs its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSignaler;

impl SchedulerSignaler for NoopSignaler {
    fn signal_scheduling_change(&self, _: Option<DateTime<Utc>>) {}

    fn notify_job_added(&self, _: &JobDetail) {}

    fn notify_job_deleted(&self, _: &JobKey) {}

    fn notify_job_scheduled(&self, _: &Trigger) {}

    fn notify_job_unscheduled(&self, _: &TriggerKey) {}

    fn notify_trigger_misfired(&self, _: &Trigger) {}

    fn notify_trigger_finalized(&self, _: &Trigger) {}
}

/// Signal raised inside a transaction and delivered after it commits.
#[derive(Debug, Clone)]
pub(crate) enum PendingSignal {
    SchedulingChange(Option<DateTime<Utc>>),
    JobDeleted(JobKey),
    TriggerMisfired(Trigger),
    TriggerFinalized(Trigger),
}

impl PendingSignal {
    pub(crate) fn deliver(&self, signaler: &dyn SchedulerSignaler) {
        match self {
            PendingSignal::SchedulingChange(candidate) => {
                signaler.signal_scheduling_change(*candidate)
            }
            PendingSignal::JobDeleted(key) => signaler.notify_job_deleted(key),
            PendingSignal::TriggerMisfired(trigger) => {
                signaler.notify_trigger_misfired(trigger)
            }
            PendingSignal::TriggerFinalized(trigger) => {
                signaler.notify_trigger_finalized(trigger)
            }
        }
    }
}
