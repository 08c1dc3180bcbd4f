use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use cadence_model::{
    Calendar, CompletedExecutionInstruction, GroupMatcher, JobDetail, JobKey, Trigger, TriggerKey,
    TriggerStatus,
};

use super::transaction::{Committed, TxContext};
use super::{JobStore, TriggerFiredOutcome};
use crate::clock::{Clock, SystemClock};
use crate::cluster::{Locality, NodeAccess};
use crate::config::JobStoreConfig;
use crate::error::{JobStoreError, Result};
use crate::events::{SchedulerEvent, SchedulerEventPayload, SchedulerEventPublisher};
use crate::signaler::SchedulerSignaler;
use crate::store::{CodecRegistry, DocumentStore, RecordKind};

/// [`JobStore`] implementation over any [`DocumentStore`].
///
/// One coordinator runs per node. Operations on the same node are
/// serialised by an internal monitor; nodes sharing a store are kept
/// consistent by the store's optimistic concurrency and the retry loop.
pub struct JobStoreCoordinator {
    store: Arc<dyn DocumentStore>,
    codec: Arc<CodecRegistry>,
    node: Arc<dyn NodeAccess>,
    clock: Arc<dyn Clock>,
    config: JobStoreConfig,
    signaler: OnceLock<Arc<dyn SchedulerSignaler>>,
    publisher: Option<Arc<dyn SchedulerEventPublisher>>,
    monitor: Mutex<()>,
}

impl fmt::Debug for JobStoreCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStoreCoordinator")
            .field("store", &self.store)
            .field("node", &self.node.local_node_id())
            .field("clustered", &self.node.is_clustered())
            .field("config", &self.config)
            .field("initialized", &self.signaler.get().is_some())
            .field("publishes_events", &self.publisher.is_some())
            .finish()
    }
}

impl JobStoreCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        node: Arc<dyn NodeAccess>,
        config: JobStoreConfig,
    ) -> Self {
        Self {
            store,
            codec: Arc::new(CodecRegistry::with_builtin_calendars()),
            node,
            clock: Arc::new(SystemClock),
            config,
            signaler: OnceLock::new(),
            publisher: None,
            monitor: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_codec(mut self, codec: Arc<CodecRegistry>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn SchedulerEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    pub fn node(&self) -> Arc<dyn NodeAccess> {
        Arc::clone(&self.node)
    }

    /// Runs `work` in a store transaction under the node monitor.
    ///
    /// Retryable store failures restart the whole closure with jittered
    /// exponential backoff. Buffered signals and change events are only
    /// dispatched once an attempt has committed.
    async fn execute<T, F>(&self, op: &'static str, mut work: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&mut TxContext<'_>) -> Result<T> + Send,
    {
        let guard = self.monitor.lock().await;
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        let committed = loop {
            attempt += 1;
            let err = match self.run_attempt(&mut work) {
                Ok(committed) => break committed,
                Err(err) => err,
            };

            match err {
                JobStoreError::Store(source) if source.is_retryable() => {
                    if attempt >= retry.max_attempts {
                        warn!(op, attempts = attempt, error = %source, "giving up on transaction");
                        return Err(JobStoreError::RetriesExhausted {
                            attempts: attempt,
                            source,
                        });
                    }
                    let jitter = rand::random::<f64>();
                    let delay_ms = retry.jittered_delay_ms(attempt, jitter);
                    debug!(op, attempt, delay_ms, error = %source, "retrying transaction");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                other => return Err(other),
            }
        };
        drop(guard);

        trace!(op, attempts = attempt, "transaction committed");
        Ok(self.dispatch(committed).await)
    }

    fn run_attempt<T, F>(&self, work: &mut F) -> Result<Committed<T>>
    where
        F: FnMut(&mut TxContext<'_>) -> Result<T>,
    {
        let tx = self.store.begin()?;
        let mut ctx = TxContext::new(
            tx,
            &self.codec,
            Locality::capture(self.node.as_ref()),
            &self.config,
            self.clock.now(),
        );
        let value = work(&mut ctx)?;
        ctx.commit(value)
    }

    async fn dispatch<T>(&self, committed: Committed<T>) -> T {
        let Committed {
            value,
            signals,
            changes,
        } = committed;

        match self.signaler.get() {
            Some(signaler) => {
                for signal in &signals {
                    signal.deliver(signaler.as_ref());
                }
            }
            None if !signals.is_empty() => {
                trace!(count = signals.len(), "signals dropped before initialization");
            }
            None => {}
        }

        if let Some(publisher) = &self.publisher {
            let origin = self.node.local_node_id().to_string();
            let occurred_at = self.clock.now();
            for payload in changes.iter().filter_map(SchedulerEventPayload::from_change) {
                let event = SchedulerEvent::new(origin.clone(), occurred_at, payload);
                if let Err(err) = publisher.publish(event).await {
                    warn!(error = %err, "failed to publish scheduler event");
                }
            }
        }

        value
    }
}

#[async_trait]
impl JobStore for JobStoreCoordinator {
    async fn initialize(&self, signaler: Arc<dyn SchedulerSignaler>) -> Result<()> {
        self.signaler.set(signaler).map_err(|_| {
            JobStoreError::Configuration("job store is already initialized".into())
        })?;
        info!(
            node = %self.node.local_node_id(),
            clustered = self.node.is_clustered(),
            "job store initialized"
        );
        Ok(())
    }

    async fn scheduler_started(&self) -> Result<()> {
        self.execute("scheduler_started", |ctx| ctx.recover_local_triggers())
            .await?;
        info!(node = %self.node.local_node_id(), "recovered local triggers");
        Ok(())
    }

    async fn scheduler_paused(&self) {
        debug!("scheduler paused");
    }

    async fn scheduler_resumed(&self) {
        debug!("scheduler resumed");
    }

    async fn shutdown(&self) {
        info!(node = %self.node.local_node_id(), "job store shut down");
    }

    fn supports_persistence(&self) -> bool {
        true
    }

    fn is_clustered(&self) -> bool {
        self.node.is_clustered()
    }

    fn estimated_time_to_release_and_acquire(&self) -> Duration {
        self.config.estimated_release_acquire()
    }

    async fn store_job(&self, job: JobDetail, replace: bool) -> Result<()> {
        self.execute("store_job", |ctx| ctx.store_job(job.clone(), replace))
            .await
    }

    async fn store_job_and_trigger(&self, job: JobDetail, trigger: Trigger) -> Result<()> {
        self.execute("store_job_and_trigger", |ctx| {
            ctx.store_job(job.clone(), false)?;
            ctx.store_trigger(trigger.clone(), false)
        })
        .await
    }

    async fn store_jobs_and_triggers(
        &self,
        entries: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
    ) -> Result<()> {
        self.execute("store_jobs_and_triggers", |ctx| {
            for (job, triggers) in &entries {
                ctx.store_job(job.clone(), replace)?;
                for trigger in triggers {
                    ctx.store_trigger(trigger.clone(), replace)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn remove_job(&self, key: &JobKey) -> Result<bool> {
        self.execute("remove_job", |ctx| ctx.remove_job(key)).await
    }

    async fn remove_jobs(&self, keys: &[JobKey]) -> Result<bool> {
        self.execute("remove_jobs", |ctx| {
            let mut all_found = true;
            for key in keys {
                all_found &= ctx.remove_job(key)?;
            }
            Ok(all_found)
        })
        .await
    }

    async fn retrieve_job(&self, key: &JobKey) -> Result<Option<JobDetail>> {
        self.execute("retrieve_job", |ctx| ctx.read_job(key)).await
    }

    async fn check_job_exists(&self, key: &JobKey) -> Result<bool> {
        self.execute("check_job_exists", |ctx| ctx.job_exists(key))
            .await
    }

    async fn number_of_jobs(&self) -> Result<usize> {
        self.execute("number_of_jobs", |ctx| ctx.count(RecordKind::Job))
            .await
    }

    async fn job_group_names(&self) -> Result<Vec<String>> {
        self.execute("job_group_names", |ctx| ctx.group_names(RecordKind::Job))
            .await
    }

    async fn job_keys(&self, matcher: &GroupMatcher) -> Result<Vec<JobKey>> {
        self.execute("job_keys", |ctx| ctx.job_keys(matcher)).await
    }

    async fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.execute("pause_job", |ctx| ctx.pause_job(key)).await
    }

    async fn pause_jobs(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        self.execute("pause_jobs", |ctx| ctx.pause_jobs(matcher)).await
    }

    async fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.execute("resume_job", |ctx| ctx.resume_job(key)).await
    }

    async fn resume_jobs(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        self.execute("resume_jobs", |ctx| ctx.resume_jobs(matcher)).await
    }

    async fn store_trigger(&self, trigger: Trigger, replace: bool) -> Result<()> {
        self.execute("store_trigger", |ctx| {
            ctx.store_trigger(trigger.clone(), replace)
        })
        .await
    }

    async fn remove_trigger(&self, key: &TriggerKey) -> Result<bool> {
        self.execute("remove_trigger", |ctx| ctx.remove_trigger(key))
            .await
    }

    async fn remove_triggers(&self, keys: &[TriggerKey]) -> Result<bool> {
        self.execute("remove_triggers", |ctx| {
            let mut all_found = true;
            for key in keys {
                all_found &= ctx.remove_trigger(key)?;
            }
            Ok(all_found)
        })
        .await
    }

    async fn replace_trigger(&self, old: &TriggerKey, new: Trigger) -> Result<bool> {
        self.execute("replace_trigger", |ctx| {
            ctx.replace_trigger(old, new.clone())
        })
        .await
    }

    async fn retrieve_trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>> {
        self.execute("retrieve_trigger", |ctx| {
            Ok(ctx.read_trigger(key)?.map(|record| record.trigger))
        })
        .await
    }

    async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool> {
        self.execute("check_trigger_exists", |ctx| ctx.trigger_exists(key))
            .await
    }

    async fn number_of_triggers(&self) -> Result<usize> {
        self.execute("number_of_triggers", |ctx| {
            ctx.count(RecordKind::Trigger)
        })
        .await
    }

    async fn trigger_group_names(&self) -> Result<Vec<String>> {
        self.execute("trigger_group_names", |ctx| {
            ctx.group_names(RecordKind::Trigger)
        })
        .await
    }

    async fn trigger_keys(&self, matcher: &GroupMatcher) -> Result<Vec<TriggerKey>> {
        self.execute("trigger_keys", |ctx| ctx.trigger_keys(matcher))
            .await
    }

    async fn triggers_for_job(&self, key: &JobKey) -> Result<Vec<Trigger>> {
        self.execute("triggers_for_job", |ctx| {
            let mut triggers: Vec<Trigger> = ctx
                .triggers_of_job(key)?
                .into_iter()
                .map(|record| record.trigger)
                .collect();
            triggers.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(triggers)
        })
        .await
    }

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerStatus> {
        self.execute("trigger_state", |ctx| ctx.trigger_status(key))
            .await
    }

    async fn reset_trigger_from_error_state(&self, key: &TriggerKey) -> Result<()> {
        self.execute("reset_trigger_from_error_state", |ctx| {
            ctx.reset_trigger_from_error_state(key)
        })
        .await
    }

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.execute("pause_trigger", |ctx| ctx.pause_trigger(key))
            .await
    }

    async fn pause_triggers(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        self.execute("pause_triggers", |ctx| ctx.pause_triggers(matcher))
            .await
    }

    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.execute("resume_trigger", |ctx| ctx.resume_trigger(key))
            .await
    }

    async fn resume_triggers(&self, matcher: &GroupMatcher) -> Result<BTreeSet<String>> {
        self.execute("resume_triggers", |ctx| ctx.resume_triggers(matcher))
            .await
    }

    async fn pause_all(&self) -> Result<()> {
        self.execute("pause_all", |ctx| ctx.pause_all()).await
    }

    async fn resume_all(&self) -> Result<()> {
        self.execute("resume_all", |ctx| ctx.resume_all()).await
    }

    async fn paused_trigger_groups(&self) -> Result<BTreeSet<String>> {
        self.execute("paused_trigger_groups", |ctx| {
            ctx.paused_trigger_groups()
        })
        .await
    }

    async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: TimeDelta,
    ) -> Result<Vec<Trigger>> {
        self.execute("acquire_next_triggers", |ctx| {
            ctx.acquire_next_triggers(no_later_than, max_count, time_window)
        })
        .await
    }

    async fn release_acquired_trigger(&self, trigger: &Trigger) -> Result<()> {
        self.execute("release_acquired_trigger", |ctx| {
            ctx.release_acquired_trigger(&trigger.key)
        })
        .await
    }

    async fn triggers_fired(&self, triggers: &[Trigger]) -> Result<Vec<TriggerFiredOutcome>> {
        let outcomes = self
            .execute("triggers_fired", |ctx| ctx.triggers_fired(triggers))
            .await?;

        for (trigger, outcome) in triggers.iter().zip(&outcomes) {
            match outcome {
                TriggerFiredOutcome::Failed(err @ JobStoreError::Invariant(_)) => {
                    error!(trigger = %trigger.key, error = %err, "trigger fired without a job");
                }
                TriggerFiredOutcome::Failed(err) => {
                    warn!(trigger = %trigger.key, error = %err, "failed to fire trigger");
                }
                _ => {}
            }
        }
        Ok(outcomes)
    }

    async fn triggered_job_complete(
        &self,
        trigger: &Trigger,
        job: &JobDetail,
        instruction: CompletedExecutionInstruction,
    ) -> Result<()> {
        self.execute("triggered_job_complete", |ctx| {
            ctx.triggered_job_complete(trigger, job, instruction)
        })
        .await
    }

    async fn store_calendar(
        &self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        self.execute("store_calendar", |ctx| {
            ctx.store_calendar(name, Arc::clone(&calendar), replace, update_triggers)
        })
        .await
    }

    async fn remove_calendar(&self, name: &str) -> Result<bool> {
        self.execute("remove_calendar", |ctx| ctx.remove_calendar(name))
            .await
    }

    async fn retrieve_calendar(&self, name: &str) -> Result<Option<Arc<dyn Calendar>>> {
        self.execute("retrieve_calendar", |ctx| ctx.find_calendar(name))
            .await
    }

    async fn number_of_calendars(&self) -> Result<usize> {
        self.execute("number_of_calendars", |ctx| {
            ctx.count(RecordKind::Calendar)
        })
        .await
    }

    async fn calendar_names(&self) -> Result<Vec<String>> {
        self.execute("calendar_names", |ctx| ctx.calendar_names())
            .await
    }

    async fn clear_all_scheduling_data(&self) -> Result<()> {
        self.execute("clear_all_scheduling_data", |ctx| ctx.clear_all())
            .await
    }
}
