//! Calendars shipped with the store and registered by
//! [`crate::store::CodecRegistry::with_builtin_calendars`].

use std::collections::BTreeSet;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use cadence_model::Calendar;

/// Excludes whole UTC days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    #[serde(default)]
    pub description: Option<String>,
    pub excluded_dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub const TYPE: &'static str = "cadence.holiday";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_excluded_date(&mut self, date: NaiveDate) {
        self.excluded_dates.insert(date);
    }

    pub fn remove_excluded_date(&mut self, date: &NaiveDate) -> bool {
        self.excluded_dates.remove(date)
    }
}

impl Calendar for HolidayCalendar {
    fn calendar_type(&self) -> &'static str {
        Self::TYPE
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn is_time_included(&self, at: DateTime<Utc>) -> bool {
        !self.excluded_dates.contains(&at.date_naive())
    }

    fn next_included_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = after.checked_add_signed(TimeDelta::milliseconds(1))?;
        // Consecutive excluded days are the worst case.
        for _ in 0..=self.excluded_dates.len() {
            if self.is_time_included(candidate) {
                return Some(candidate);
            }
            let next_day = candidate.date_naive().checked_add_days(Days::new(1))?;
            candidate = next_day.and_time(NaiveTime::MIN).and_utc();
        }
        None
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Excludes a time-of-day window on every UTC day, or everything but that
/// window when `invert` is set. A window whose start is after its end wraps
/// past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCalendar {
    #[serde(default)]
    pub description: Option<String>,
    pub range_start: NaiveTime,
    pub range_end: NaiveTime,
    #[serde(default)]
    pub invert: bool,
}

impl DailyCalendar {
    pub const TYPE: &'static str = "cadence.daily";

    pub fn excluding(range_start: NaiveTime, range_end: NaiveTime) -> Self {
        Self {
            description: None,
            range_start,
            range_end,
            invert: false,
        }
    }

    pub fn only_within(range_start: NaiveTime, range_end: NaiveTime) -> Self {
        Self {
            invert: true,
            ..Self::excluding(range_start, range_end)
        }
    }

    fn in_window(&self, time: NaiveTime) -> bool {
        if self.range_start <= self.range_end {
            time >= self.range_start && time < self.range_end
        } else {
            time >= self.range_start || time < self.range_end
        }
    }

    /// First instant at or after `from` whose time of day is `time`.
    fn next_occurrence(from: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
        let same_day = from.date_naive().and_time(time).and_utc();
        if same_day >= from {
            return Some(same_day);
        }
        let next_day = from.date_naive().checked_add_days(Days::new(1))?;
        Some(next_day.and_time(time).and_utc())
    }
}

impl Calendar for DailyCalendar {
    fn calendar_type(&self) -> &'static str {
        Self::TYPE
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn is_time_included(&self, at: DateTime<Utc>) -> bool {
        self.in_window(at.time()) == self.invert
    }

    fn next_included_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let candidate = after.checked_add_signed(TimeDelta::milliseconds(1))?;
        if self.is_time_included(candidate) {
            return Some(candidate);
        }
        if self.range_start == self.range_end {
            // Empty window: inverted calendars include nothing.
            return None;
        }
        let boundary = if self.invert {
            self.range_start
        } else {
            self.range_end
        };
        Self::next_occurrence(candidate, boundary)
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn holiday_calendar_skips_consecutive_days() {
        let mut calendar = HolidayCalendar::new();
        calendar.add_excluded_date(NaiveDate::from_ymd_opt(2026, 12, 25).unwrap());
        calendar.add_excluded_date(NaiveDate::from_ymd_opt(2026, 12, 26).unwrap());

        assert!(!calendar.is_time_included(utc(2026, 12, 25, 9, 0)));
        assert_eq!(
            calendar.next_included_time(utc(2026, 12, 25, 9, 0)),
            Some(utc(2026, 12, 27, 0, 0))
        );
    }

    #[test]
    fn daily_calendar_excludes_window() {
        let calendar = DailyCalendar::excluding(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        assert!(!calendar.is_time_included(utc(2026, 3, 1, 23, 30)));
        assert!(!calendar.is_time_included(utc(2026, 3, 2, 5, 59)));
        assert!(calendar.is_time_included(utc(2026, 3, 2, 6, 0)));
        assert_eq!(
            calendar.next_included_time(utc(2026, 3, 1, 23, 30)),
            Some(utc(2026, 3, 2, 6, 0))
        );
    }

    #[test]
    fn inverted_daily_calendar_only_includes_window() {
        let calendar = DailyCalendar::only_within(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
        assert!(calendar.is_time_included(utc(2026, 3, 2, 12, 0)));
        assert!(!calendar.is_time_included(utc(2026, 3, 2, 18, 0)));
        assert_eq!(
            calendar.next_included_time(utc(2026, 3, 2, 18, 0)),
            Some(utc(2026, 3, 3, 9, 0))
        );
    }
}
