use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use cadence_model::{Calendar, JobDetail, JobTypeId, Trigger, TriggerState};

use super::RecordKind;
use crate::calendar::{DailyCalendar, HolidayCalendar};
use crate::error::CodecError;

pub const JOB_TAG: &str = "job";
pub const TRIGGER_TAG: &str = "trigger";

/// Stored form of a trigger: the trigger value plus its execution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub trigger: Trigger,
    pub state: TriggerState,
}

/// Domain value carried by a stored record.
#[derive(Debug, Clone)]
pub enum EntityPayload {
    Job(JobDetail),
    Trigger(TriggerRecord),
    Calendar(Arc<dyn Calendar>),
}

impl EntityPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            EntityPayload::Job(_) => RecordKind::Job,
            EntityPayload::Trigger(_) => RecordKind::Trigger,
            EntityPayload::Calendar(_) => RecordKind::Calendar,
        }
    }
}

type CalendarDecoder = fn(&str) -> Result<Arc<dyn Calendar>, serde_json::Error>;

fn decode_calendar<C>(raw: &str) -> Result<Arc<dyn Calendar>, serde_json::Error>
where
    C: Calendar + DeserializeOwned + 'static,
{
    Ok(Arc::new(serde_json::from_str::<C>(raw)?))
}

/// Marshaller between [`EntityPayload`] values and `(type tag, JSON)` pairs.
///
/// Calendar types must be registered under the tag their
/// [`Calendar::calendar_type`] reports. Job types are unrestricted until
/// [`CodecRegistry::register_job_type`] is called at least once.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    calendars: HashMap<String, CalendarDecoder>,
    job_types: Option<HashSet<JobTypeId>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut calendar_types: Vec<_> = self.calendars.keys().collect();
        calendar_types.sort();
        f.debug_struct("CodecRegistry")
            .field("calendar_types", &calendar_types)
            .field("job_types", &self.job_types)
            .finish()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that already knows the calendars shipped with this crate.
    pub fn with_builtin_calendars() -> Self {
        let mut registry = Self::new();
        registry.register_calendar::<HolidayCalendar>(HolidayCalendar::TYPE);
        registry.register_calendar::<DailyCalendar>(DailyCalendar::TYPE);
        registry
    }

    pub fn register_calendar<C>(&mut self, tag: impl Into<String>)
    where
        C: Calendar + DeserializeOwned + 'static,
    {
        self.calendars
            .insert(tag.into(), decode_calendar::<C> as CalendarDecoder);
    }

    pub fn register_job_type(&mut self, job_type: JobTypeId) {
        self.job_types
            .get_or_insert_with(HashSet::new)
            .insert(job_type);
    }

    pub fn is_job_type_resolvable(&self, job_type: &JobTypeId) -> bool {
        self.job_types
            .as_ref()
            .is_none_or(|known| known.contains(job_type))
    }

    pub fn encode(
        &self,
        payload: &EntityPayload,
    ) -> Result<(String, String), CodecError> {
        match payload {
            EntityPayload::Job(job) => {
                Ok((JOB_TAG.to_string(), serde_json::to_string(job)?))
            }
            EntityPayload::Trigger(record) => {
                Ok((TRIGGER_TAG.to_string(), serde_json::to_string(record)?))
            }
            EntityPayload::Calendar(calendar) => {
                let tag = calendar.calendar_type();
                if !self.calendars.contains_key(tag) {
                    return Err(CodecError::UnknownCalendarType(tag.to_string()));
                }
                Ok((tag.to_string(), calendar.to_payload()?.to_string()))
            }
        }
    }

    pub fn decode(
        &self,
        kind: RecordKind,
        tag: &str,
        raw: &str,
    ) -> Result<EntityPayload, CodecError> {
        match kind {
            RecordKind::Job if tag == JOB_TAG => {
                let job: JobDetail = serde_json::from_str(raw)?;
                if !self.is_job_type_resolvable(&job.job_type) {
                    return Err(CodecError::UnknownJobType(job.job_type));
                }
                Ok(EntityPayload::Job(job))
            }
            RecordKind::Trigger if tag == TRIGGER_TAG => {
                Ok(EntityPayload::Trigger(serde_json::from_str(raw)?))
            }
            RecordKind::Calendar => {
                let decoder = self
                    .calendars
                    .get(tag)
                    .ok_or_else(|| CodecError::UnknownCalendarType(tag.to_string()))?;
                Ok(EntityPayload::Calendar(decoder(raw)?))
            }
            _ => Err(CodecError::UnexpectedPayload {
                kind,
                tag: tag.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_model::JobKey;
    use chrono::NaiveDate;

    #[test]
    fn restricted_job_types_reject_unknown_jobs() {
        let mut registry = CodecRegistry::new();
        registry.register_job_type(JobTypeId::new("known"));

        let job = JobDetail::new(
            JobKey::in_default_group("j"),
            JobTypeId::new("missing"),
        );
        let (tag, raw) = registry.encode(&EntityPayload::Job(job)).unwrap();
        let err = registry.decode(RecordKind::Job, &tag, &raw).unwrap_err();
        assert!(matches!(err, CodecError::UnknownJobType(id) if id.as_str() == "missing"));
    }

    #[test]
    fn calendars_decode_through_registered_tag() {
        let registry = CodecRegistry::with_builtin_calendars();
        let mut holidays = HolidayCalendar::new();
        holidays.add_excluded_date(NaiveDate::from_ymd_opt(2026, 12, 25).unwrap());
        let payload = EntityPayload::Calendar(Arc::new(holidays));

        let (tag, raw) = registry.encode(&payload).unwrap();
        assert_eq!(tag, HolidayCalendar::TYPE);
        let decoded = registry.decode(RecordKind::Calendar, &tag, &raw).unwrap();
        let EntityPayload::Calendar(calendar) = decoded else {
            panic!("expected calendar payload");
        };
        assert_eq!(calendar.calendar_type(), HolidayCalendar::TYPE);

        let empty = CodecRegistry::new();
        assert!(matches!(
            empty.decode(RecordKind::Calendar, &tag, &raw),
            Err(CodecError::UnknownCalendarType(_))
        ));
    }

    #[test]
    fn mismatched_tags_are_rejected() {
        let registry = CodecRegistry::new();
        let err = registry
            .decode(RecordKind::Job, TRIGGER_TAG, "{}")
            .unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedPayload { .. }));
    }
}
