use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::calendar::Calendar;
use crate::job::JobDetail;
use crate::trigger::Trigger;

/// Everything the scheduler runtime needs to execute one firing.
#[derive(Debug, Clone)]
pub struct TriggerFiredBundle {
    pub job: JobDetail,
    /// The trigger after its firing was recorded.
    pub trigger: Trigger,
    pub calendar: Option<Arc<dyn Calendar>>,
    pub recovering: bool,
    pub fire_time: DateTime<Utc>,
    pub scheduled_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
}
