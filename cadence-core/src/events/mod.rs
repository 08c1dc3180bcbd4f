//! Domain events raised by committed store mutations and replayed on the
//! other nodes of a cluster.

pub mod bus;
pub mod propagator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use cadence_model::{JobKey, TriggerKey};

use crate::error::Result;
use crate::store::{RecordChange, RecordKind};

pub use bus::InProcSchedulerEventBus;
pub use propagator::{ClusterEventPropagator, PropagatorHandle};

/// Job or trigger lifecycle transition observed on commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEventPayload {
    JobCreated(JobKey),
    JobUpdated(JobKey),
    JobDeleted(JobKey),
    TriggerCreated(TriggerKey),
    TriggerUpdated(TriggerKey),
    TriggerDeleted(TriggerKey),
}

impl SchedulerEventPayload {
    /// Event for a committed record change. Calendars are not propagated.
    pub fn from_change(change: &RecordChange) -> Option<Self> {
        let id = change.id();
        let payload = match (id.kind, change) {
            (RecordKind::Job, RecordChange::Created(_)) => {
                Self::JobCreated(JobKey::new(id.name.as_str(), id.group.as_str()))
            }
            (RecordKind::Job, RecordChange::Updated(_)) => {
                Self::JobUpdated(JobKey::new(id.name.as_str(), id.group.as_str()))
            }
            (RecordKind::Job, RecordChange::Deleted(_)) => {
                Self::JobDeleted(JobKey::new(id.name.as_str(), id.group.as_str()))
            }
            (RecordKind::Trigger, RecordChange::Created(_)) => Self::TriggerCreated(
                TriggerKey::new(id.name.as_str(), id.group.as_str()),
            ),
            (RecordKind::Trigger, RecordChange::Updated(_)) => Self::TriggerUpdated(
                TriggerKey::new(id.name.as_str(), id.group.as_str()),
            ),
            (RecordKind::Trigger, RecordChange::Deleted(_)) => Self::TriggerDeleted(
                TriggerKey::new(id.name.as_str(), id.group.as_str()),
            ),
            (RecordKind::Calendar, _) => return None,
        };
        Some(payload)
    }
}

/// Event envelope tagged with the node whose transaction produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerEvent {
    pub event_id: Uuid,
    pub origin_node: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: SchedulerEventPayload,
}

impl SchedulerEvent {
    pub fn new(
        origin_node: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: SchedulerEventPayload,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            origin_node: origin_node.into(),
            occurred_at,
            payload,
        }
    }

    pub fn is_local_to(&self, node_id: &str) -> bool {
        self.origin_node == node_id
    }
}

#[async_trait]
pub trait SchedulerEventPublisher: Send + Sync + std::fmt::Debug {
    async fn publish(&self, event: SchedulerEvent) -> Result<()>;
}

pub trait SchedulerEventStream {
    fn subscribe_scheduler_events(&self) -> broadcast::Receiver<SchedulerEvent>;
}
