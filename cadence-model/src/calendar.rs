use std::fmt;

use chrono::{DateTime, Utc};

/// Time-exclusion rules consulted when computing fire times.
///
/// Calendars are opaque to the job store: it persists them through the
/// codec registry (keyed by [`Calendar::calendar_type`]) and hands them to
/// trigger arithmetic without interpreting them.
pub trait Calendar: fmt::Debug + Send + Sync {
    /// Registry tag used to pick the decoder when the calendar is read back.
    fn calendar_type(&self) -> &'static str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn is_time_included(&self, at: DateTime<Utc>) -> bool;

    /// Earliest included instant strictly after `after`, if any.
    fn next_included_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Serialized form stored alongside the registry tag.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}
