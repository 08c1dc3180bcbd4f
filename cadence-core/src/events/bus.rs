use async_trait::async_trait;
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

use super::{SchedulerEvent, SchedulerEventPublisher, SchedulerEventStream};
use crate::error::Result;

/// In-process event bus shared by every node of a cluster living in one
/// process. Each node subscribes once and filters out its own events.
#[derive(Clone)]
pub struct InProcSchedulerEventBus {
    sender: broadcast::Sender<SchedulerEvent>,
    channel_capacity: usize,
}

impl fmt::Debug for InProcSchedulerEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcSchedulerEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcSchedulerEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            channel_capacity: capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl SchedulerEventPublisher for InProcSchedulerEventBus {
    async fn publish(&self, event: SchedulerEvent) -> Result<()> {
        // No subscribers is not an error: single-node setups never listen.
        if self.sender.send(event).is_err() {
            trace!("scheduler event dropped, no subscribers");
        }
        Ok(())
    }
}

impl SchedulerEventStream for InProcSchedulerEventBus {
    fn subscribe_scheduler_events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SchedulerEventPayload;
    use cadence_model::JobKey;
    use chrono::Utc;

    #[tokio::test]
    async fn every_subscriber_sees_published_events() {
        let bus = InProcSchedulerEventBus::new(0);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe_scheduler_events();

        let event = SchedulerEvent::new(
            "a",
            Utc::now(),
            SchedulerEventPayload::JobDeleted(JobKey::in_default_group("j")),
        );
        bus.publish(event.clone()).await.unwrap();

        assert_eq!(first.recv().await.unwrap().event_id, event.event_id);
        assert_eq!(second.recv().await.unwrap().event_id, event.event_id);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = InProcSchedulerEventBus::new(4);
        let event = SchedulerEvent::new(
            "a",
            Utc::now(),
            SchedulerEventPayload::JobDeleted(JobKey::in_default_group("j")),
        );
        assert!(bus.publish(event).await.is_ok());
    }
}
