#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cadence_core::model::chrono::{DateTime, TimeDelta, TimeZone, Utc};
use cadence_core::model::{JobDetail, JobKey, JobTypeId, Schedule, Trigger, TriggerKey};
use cadence_core::{
    FakeClock, JobStore, JobStoreConfig, JobStoreCoordinator, LocalNode, MemoryDocumentStore,
    NodeAccess, SchedulerEventPublisher, SchedulerSignaler,
};

/// Everything a signaler can be told, flattened to keys for easy asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    SchedulingChange(Option<DateTime<Utc>>),
    JobAdded(JobKey),
    JobDeleted(JobKey),
    JobScheduled(TriggerKey),
    JobUnscheduled(TriggerKey),
    Misfired(TriggerKey),
    Finalized(TriggerKey),
}

#[derive(Debug, Default)]
pub struct RecordingSignaler {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingSignaler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, signal: Signal) {
        self.signals.lock().expect("signal log").push(signal);
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().expect("signal log").clone()
    }

    pub fn take(&self) -> Vec<Signal> {
        std::mem::take(&mut *self.signals.lock().expect("signal log"))
    }

    pub fn count(&self, wanted: &Signal) -> usize {
        self.signals()
            .iter()
            .filter(|signal| *signal == wanted)
            .count()
    }
}

impl SchedulerSignaler for RecordingSignaler {
    fn signal_scheduling_change(&self, candidate: Option<DateTime<Utc>>) {
        self.push(Signal::SchedulingChange(candidate));
    }

    fn notify_job_added(&self, job: &JobDetail) {
        self.push(Signal::JobAdded(job.key.clone()));
    }

    fn notify_job_deleted(&self, key: &JobKey) {
        self.push(Signal::JobDeleted(key.clone()));
    }

    fn notify_job_scheduled(&self, trigger: &Trigger) {
        self.push(Signal::JobScheduled(trigger.key.clone()));
    }

    fn notify_job_unscheduled(&self, key: &TriggerKey) {
        self.push(Signal::JobUnscheduled(key.clone()));
    }

    fn notify_trigger_misfired(&self, trigger: &Trigger) {
        self.push(Signal::Misfired(trigger.key.clone()));
    }

    fn notify_trigger_finalized(&self, trigger: &Trigger) {
        self.push(Signal::Finalized(trigger.key.clone()));
    }
}

/// 2026-01-05 12:00:00 UTC, a Monday.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0)
        .single()
        .expect("valid base time")
}

/// Config with a fast retry loop so conflict tests stay quick.
pub fn test_config() -> JobStoreConfig {
    let mut config = JobStoreConfig::default();
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 4;
    config
}

/// One coordinator with the clock and signaler it was wired with.
#[derive(Debug)]
pub struct Node {
    pub store: Arc<JobStoreCoordinator>,
    pub clock: Arc<FakeClock>,
    pub signaler: Arc<RecordingSignaler>,
}

pub struct NodeBuilder {
    documents: Arc<MemoryDocumentStore>,
    node: Arc<dyn NodeAccess>,
    clock: Arc<FakeClock>,
    config: JobStoreConfig,
    publisher: Option<Arc<dyn SchedulerEventPublisher>>,
}

impl NodeBuilder {
    pub fn new(documents: Arc<MemoryDocumentStore>, node: Arc<dyn NodeAccess>) -> Self {
        Self {
            documents,
            node,
            clock: Arc::new(FakeClock::new(base_time())),
            config: test_config(),
            publisher: None,
        }
    }

    pub fn clock(mut self, clock: Arc<FakeClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: JobStoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn SchedulerEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub async fn start(self) -> Node {
        let mut coordinator = JobStoreCoordinator::new(self.documents, self.node, self.config)
            .with_clock(self.clock.clone());
        if let Some(publisher) = self.publisher {
            coordinator = coordinator.with_event_publisher(publisher);
        }
        let signaler = RecordingSignaler::new();
        coordinator
            .initialize(signaler.clone())
            .await
            .expect("initialize job store");
        Node {
            store: Arc::new(coordinator),
            clock: self.clock,
            signaler,
        }
    }
}

/// Single, non-clustered node over a fresh in-memory store.
pub async fn single_node() -> Node {
    NodeBuilder::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(LocalNode::new("solo")),
    )
    .start()
    .await
}

pub fn job(name: &str) -> JobDetail {
    JobDetail::new(JobKey::in_default_group(name), JobTypeId::new("test.job"))
}

pub fn exclusive_job(name: &str) -> JobDetail {
    job(name).disallow_concurrent_execution(true)
}

pub fn once(name: &str, job: &str, at: DateTime<Utc>) -> Trigger {
    Trigger::new(
        TriggerKey::in_default_group(name),
        JobKey::in_default_group(job),
        Schedule::Once,
        at,
    )
}

pub fn every_minute(name: &str, job: &str, start: DateTime<Utc>) -> Trigger {
    Trigger::new(
        TriggerKey::in_default_group(name),
        JobKey::in_default_group(job),
        Schedule::every(TimeDelta::minutes(1)),
        start,
    )
}

pub fn tkey(name: &str) -> TriggerKey {
    TriggerKey::in_default_group(name)
}

pub fn jkey(name: &str) -> JobKey {
    JobKey::in_default_group(name)
}

/// Acquires everything due within the next 30 seconds.
pub async fn acquire_due(node: &Node) -> Vec<Trigger> {
    let now = cadence_core::Clock::now(node.clock.as_ref());
    node.store
        .acquire_next_triggers(now + TimeDelta::seconds(30), 10, TimeDelta::zero())
        .await
        .expect("acquire triggers")
}

pub fn keys(triggers: &[Trigger]) -> Vec<String> {
    triggers
        .iter()
        .map(|trigger| trigger.key.name().to_string())
        .collect()
}
