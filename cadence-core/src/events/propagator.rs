use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{SchedulerEvent, SchedulerEventPayload};
use crate::clock::Clock;
use crate::cluster::{Locality, NodeAccess};
use crate::config::PropagationConfig;
use crate::error::Result;
use crate::jobstore::JobStore;
use crate::signaler::SchedulerSignaler;

/// Replays scheduler events committed by other nodes into the local
/// scheduler.
pub struct ClusterEventPropagator {
    store: Arc<dyn JobStore>,
    signaler: Arc<dyn SchedulerSignaler>,
    node: Arc<dyn NodeAccess>,
    clock: Arc<dyn Clock>,
    config: PropagationConfig,
}

impl fmt::Debug for ClusterEventPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEventPropagator")
            .field("node", &self.node.local_node_id())
            .field("config", &self.config)
            .finish()
    }
}

/// Running propagator task.
#[derive(Debug)]
pub struct PropagatorHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PropagatorHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            warn!(error = %err, "event propagator task failed");
        }
    }
}

impl ClusterEventPropagator {
    pub fn new(
        store: Arc<dyn JobStore>,
        signaler: Arc<dyn SchedulerSignaler>,
        node: Arc<dyn NodeAccess>,
        clock: Arc<dyn Clock>,
        config: PropagationConfig,
    ) -> Self {
        Self {
            store,
            signaler,
            node,
            clock,
            config,
        }
    }

    /// Consumes `events` on a background task until the bus closes or the
    /// handle is shut down.
    pub fn spawn(self, mut events: broadcast::Receiver<SchedulerEvent>) -> PropagatorHandle {
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("event propagator shutting down");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(event) => {
                            if let Err(err) = self.apply(&event).await {
                                warn!(
                                    event_id = %event.event_id,
                                    error = %err,
                                    "failed to propagate scheduler event"
                                );
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event propagator lagged, events skipped");
                        }
                        Err(RecvError::Closed) => {
                            info!("scheduler event bus closed");
                            break;
                        }
                    }
                }
            }
        });

        PropagatorHandle { cancel, join }
    }

    /// Replays one event. Events raised on this node are ignored.
    pub async fn apply(&self, event: &SchedulerEvent) -> Result<()> {
        if event.is_local_to(self.node.local_node_id()) {
            return Ok(());
        }
        trace!(origin = %event.origin_node, payload = ?event.payload, "replaying remote event");

        match &event.payload {
            SchedulerEventPayload::JobCreated(key) | SchedulerEventPayload::JobUpdated(key) => {
                if let Some(job) = self.store.retrieve_job(key).await? {
                    self.signaler.notify_job_added(&job);
                }
            }
            SchedulerEventPayload::JobDeleted(key) => {
                self.signaler.notify_job_deleted(key);
            }
            SchedulerEventPayload::TriggerCreated(key) => {
                if let Some(trigger) = self.store.retrieve_trigger(key).await? {
                    self.signaler
                        .signal_scheduling_change(trigger.next_fire_time);
                    self.signaler.notify_job_scheduled(&trigger);

                    let locality = Locality::capture(self.node.as_ref());
                    let now = self.clock.now();
                    if trigger.is_run_now(now, self.config.run_now_window())
                        && locality.is_limited_to_local(&trigger)
                    {
                        debug!(trigger = %key, "run-now trigger limited to this node");
                        self.signaler.signal_scheduling_change(None);
                    }
                }
            }
            SchedulerEventPayload::TriggerUpdated(key) => {
                if let Some(trigger) = self.store.retrieve_trigger(key).await? {
                    self.signaler
                        .signal_scheduling_change(trigger.next_fire_time);
                    self.signaler.notify_job_unscheduled(key);
                    self.signaler.notify_job_scheduled(&trigger);
                }
            }
            SchedulerEventPayload::TriggerDeleted(key) => {
                self.signaler.signal_scheduling_change(None);
                self.signaler.notify_job_unscheduled(key);
            }
        }
        Ok(())
    }
}
