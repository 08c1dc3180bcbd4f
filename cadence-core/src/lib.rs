//! # Cadence Core
//!
//! Clustered job store for a Quartz-style scheduler. Jobs, triggers and
//! calendars live in a transactional [`store::DocumentStore`]; the
//! [`jobstore::JobStoreCoordinator`] owns the trigger state machine on top of
//! it and is what the scheduler runtime talks to through the
//! [`jobstore::JobStore`] trait.
//!
//! ## Architecture
//!
//! - [`store`]: record-level storage seam, typed adapters, payload codec and
//!   the in-memory engine.
//! - [`jobstore`]: acquisition, firing, completion, misfire handling, pause
//!   and resume, calendar cascades and startup recovery.
//! - [`cluster`]: membership view and the trigger locality rules.
//! - [`events`]: scheduler events raised on commit and the propagator that
//!   replays remote events into the local scheduler.
//! - [`signaler`]: the narrow callback surface back into the scheduler.
//! - [`config`]: tunables loaded from TOML or JSON.
//!
//! Logging goes through `tracing`; no subscriber is installed here.

pub mod calendar;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod jobstore;
pub mod signaler;
pub mod store;

pub use calendar::{DailyCalendar, HolidayCalendar};
pub use clock::{Clock, FakeClock, SystemClock};
pub use cluster::{LIMIT_NODE_KEY, LocalNode, NodeAccess, OWNER_NODE_KEY, StaticMembership};
pub use config::{JobStoreConfig, PropagationConfig, RetryConfig};
pub use error::{CodecError, JobStoreError, Result, StoreError, StoreResult};
pub use events::{
    ClusterEventPropagator, InProcSchedulerEventBus, PropagatorHandle, SchedulerEvent,
    SchedulerEventPayload, SchedulerEventPublisher, SchedulerEventStream,
};
pub use jobstore::{JobStore, JobStoreCoordinator, TriggerFiredOutcome};
pub use signaler::{NoopSignaler, SchedulerSignaler};
pub use store::{DocumentStore, MemoryDocumentStore, StoreTransaction};

pub use cadence_model as model;
