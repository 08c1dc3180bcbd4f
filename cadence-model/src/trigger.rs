use chrono::{DateTime, TimeDelta, Utc};

use crate::calendar::Calendar;
use crate::data_map::JobDataMap;
use crate::keys::{JobKey, TriggerKey};

/// Priority assigned to triggers that do not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Upper bound on calendar-skipping iterations before giving up on a trigger.
const MAX_CALENDAR_PROBES: usize = 10_000;

/// How a trigger recovers when its fire time passed unnoticed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MisfireInstruction {
    /// Never treated as misfired; fires as soon as it is acquired.
    IgnoreMisfirePolicy,
    #[default]
    Smart,
    FireNow,
    RescheduleNextWithRemainingCount,
    DoNothing,
}

/// Fire-time calculation of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Schedule {
    /// Fires a single time at the trigger's start time.
    Once,
    /// Fires at `start + k * interval` for `k = 0..=repeat_count`.
    /// `repeat_count: None` repeats until the end time, if any.
    Interval {
        interval_ms: i64,
        repeat_count: Option<u32>,
    },
}

impl Schedule {
    pub fn every(interval: TimeDelta) -> Self {
        Schedule::Interval {
            interval_ms: interval.num_milliseconds(),
            repeat_count: None,
        }
    }

    pub fn repeat(interval: TimeDelta, repeat_count: u32) -> Self {
        Schedule::Interval {
            interval_ms: interval.num_milliseconds(),
            repeat_count: Some(repeat_count),
        }
    }

    /// True for schedules that can fire at most once.
    pub fn is_one_shot(&self) -> bool {
        match self {
            Schedule::Once => true,
            Schedule::Interval {
                interval_ms,
                repeat_count,
            } => *interval_ms <= 0 || *repeat_count == Some(0),
        }
    }
}

/// A schedule bound to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub calendar_name: Option<String>,
    pub priority: i32,
    pub start_time: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub end_time: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub next_fire_time: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub previous_fire_time: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub misfire_instruction: MisfireInstruction,
    pub schedule: Schedule,
    #[cfg_attr(feature = "serde", serde(default))]
    pub times_triggered: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: JobDataMap,
    /// Assigned on every acquisition.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fire_instance_id: Option<String>,
}

impl Trigger {
    /// Creates a trigger whose first fire time is its start time.
    pub fn new(
        key: TriggerKey,
        job_key: JobKey,
        schedule: Schedule,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            job_key,
            description: None,
            calendar_name: None,
            priority: DEFAULT_PRIORITY,
            start_time,
            end_time: None,
            next_fire_time: Some(start_time),
            previous_fire_time: None,
            misfire_instruction: MisfireInstruction::default(),
            schedule,
            times_triggered: 0,
            data: JobDataMap::new(),
            fire_instance_id: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_calendar(mut self, calendar_name: impl Into<String>) -> Self {
        self.calendar_name = Some(calendar_name.into());
        self
    }

    pub fn with_misfire_instruction(mut self, instruction: MisfireInstruction) -> Self {
        self.misfire_instruction = instruction;
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key, value);
        self
    }

    pub fn may_fire_again(&self) -> bool {
        self.next_fire_time.is_some()
    }

    /// True for a one-shot trigger due no later than `now + window`.
    pub fn is_run_now(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.schedule.is_one_shot()
            && self.next_fire_time.is_some_and(|next| {
                next <= now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
            })
    }

    /// Next scheduled instant strictly after `after`, ignoring calendars.
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let candidate = match self.schedule {
            Schedule::Interval {
                interval_ms,
                repeat_count,
            } if interval_ms > 0 => {
                if repeat_count.is_some_and(|count| self.times_triggered > count) {
                    return None;
                }
                if after < self.start_time {
                    self.start_time
                } else {
                    let elapsed = (after - self.start_time).num_milliseconds();
                    let step = elapsed / interval_ms + 1;
                    if repeat_count.is_some_and(|count| step > i64::from(count)) {
                        return None;
                    }
                    let offset = TimeDelta::try_milliseconds(step.checked_mul(interval_ms)?)?;
                    self.start_time.checked_add_signed(offset)?
                }
            }
            _ => {
                if self.times_triggered > 0 || after >= self.start_time {
                    return None;
                }
                self.start_time
            }
        };

        match self.end_time {
            Some(end) if candidate > end => None,
            _ => Some(candidate),
        }
    }

    /// Like [`Trigger::fire_time_after`] but skipping instants the calendar excludes.
    pub fn included_fire_time_after(
        &self,
        after: DateTime<Utc>,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        let mut next = self.fire_time_after(after)?;
        let Some(calendar) = calendar else {
            return Some(next);
        };
        for _ in 0..MAX_CALENDAR_PROBES {
            if calendar.is_time_included(next) {
                return Some(next);
            }
            next = self.next_slot_past_exclusion(next, calendar)?;
        }
        None
    }

    /// First slot the calendar may include once `excluded` is known to be excluded.
    ///
    /// Jumps straight over the excluded span instead of visiting every slot in it.
    fn next_slot_past_exclusion(
        &self,
        excluded: DateTime<Utc>,
        calendar: &dyn Calendar,
    ) -> Option<DateTime<Utc>> {
        let resume = calendar.next_included_time(excluded)?;
        let floor = resume
            .checked_sub_signed(TimeDelta::milliseconds(1))
            .unwrap_or(resume)
            .max(excluded);
        self.fire_time_after(floor)
    }

    /// Sets and returns the first fire time, honouring the calendar.
    pub fn compute_first_fire_time(
        &mut self,
        calendar: Option<&dyn Calendar>,
    ) -> Option<DateTime<Utc>> {
        let start = self.start_time;
        let first = match self.end_time {
            Some(end) if start > end => None,
            _ => match calendar {
                Some(cal) if !cal.is_time_included(start) => {
                    self.included_fire_time_after(start, calendar)
                }
                _ => Some(start),
            },
        };
        self.next_fire_time = first;
        first
    }

    /// Records a firing: previous := next, next := following included fire time.
    pub fn triggered(&mut self, calendar: Option<&dyn Calendar>) {
        self.times_triggered = self.times_triggered.saturating_add(1);
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = self
            .next_fire_time
            .and_then(|fired| self.included_fire_time_after(fired, calendar));
    }

    /// Instruction actually applied, with `Smart` resolved against the schedule.
    pub fn effective_misfire_instruction(&self) -> MisfireInstruction {
        match self.misfire_instruction {
            MisfireInstruction::Smart if self.schedule.is_one_shot() => {
                MisfireInstruction::FireNow
            }
            MisfireInstruction::Smart => MisfireInstruction::RescheduleNextWithRemainingCount,
            other => other,
        }
    }

    /// Recomputes the next fire time after a misfire.
    pub fn update_after_misfire(&mut self, calendar: Option<&dyn Calendar>, now: DateTime<Utc>) {
        match self.effective_misfire_instruction() {
            MisfireInstruction::IgnoreMisfirePolicy => {}
            MisfireInstruction::FireNow => self.next_fire_time = Some(now),
            MisfireInstruction::DoNothing if self.schedule.is_one_shot() => {}
            MisfireInstruction::DoNothing
            | MisfireInstruction::RescheduleNextWithRemainingCount
            | MisfireInstruction::Smart => {
                self.next_fire_time = self.included_fire_time_after(now, calendar);
            }
        }
    }

    /// Re-derives the next fire time after the trigger's calendar changed.
    ///
    /// Candidates that would already count as misfired relative to `now` are
    /// skipped while walking past excluded instants.
    pub fn update_with_new_calendar(
        &mut self,
        calendar: &dyn Calendar,
        misfire_threshold: TimeDelta,
        now: DateTime<Utc>,
    ) {
        let mut next = match self.previous_fire_time {
            Some(previous) => self.fire_time_after(previous),
            None => match self.start_time.checked_sub_signed(TimeDelta::milliseconds(1)) {
                Some(anchor) => self.fire_time_after(anchor),
                None => self
                    .end_time
                    .is_none_or(|end| self.start_time <= end)
                    .then_some(self.start_time),
            },
        };

        let mut probes = 0;
        while let Some(candidate) = next {
            if calendar.is_time_included(candidate) {
                break;
            }
            probes += 1;
            if probes > MAX_CALENDAR_PROBES {
                next = None;
                break;
            }
            next = self.next_slot_past_exclusion(candidate, calendar);
            if let Some(following) = next
                && following < now
                && now - following >= misfire_threshold
            {
                next = self.fire_time_after(following);
            }
        }

        self.next_fire_time = next;
    }
}
