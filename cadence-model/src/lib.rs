//! Core data model shared by the Cadence job store crates.
//!
//! Everything here is plain data plus the schedule arithmetic a trigger
//! needs to compute its own fire times. Persistence, clustering and state
//! ownership live in `cadence-core`.

pub mod calendar;
pub mod data_map;
pub mod fired;
pub mod job;
pub mod keys;
pub mod matcher;
pub mod state;
pub mod trigger;

pub use calendar::Calendar;
pub use data_map::JobDataMap;
pub use fired::TriggerFiredBundle;
pub use job::{JobDetail, JobTypeId};
pub use keys::{DEFAULT_GROUP, JobKey, TriggerKey};
pub use matcher::GroupMatcher;
pub use state::{CompletedExecutionInstruction, TriggerState, TriggerStatus};
pub use trigger::{DEFAULT_PRIORITY, MisfireInstruction, Schedule, Trigger};

pub use ::chrono;
