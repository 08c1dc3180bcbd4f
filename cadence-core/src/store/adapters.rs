use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_model::{Calendar, JobDetail, JobKey, TriggerKey};

use super::codec::{CodecRegistry, EntityPayload, TriggerRecord};
use super::{IndexField, RecordId, RecordKind, StoredRecord};
use crate::error::CodecError;

/// Index value used to look up the triggers of one job.
pub fn job_index_value(key: &JobKey) -> String {
    format!("{}\u{1f}{}", key.group, key.name)
}

/// Typed view over one record kind.
pub trait RecordAdapter {
    type Key;
    type Value;

    const KIND: RecordKind;

    fn record_id(key: &Self::Key) -> RecordId;

    fn key_of(value: &Self::Value) -> RecordId;

    fn index_fields(value: &Self::Value) -> BTreeMap<IndexField, String>;

    fn wrap(value: Self::Value) -> EntityPayload;

    fn unwrap(payload: EntityPayload) -> Option<Self::Value>;

    fn encode(
        codec: &CodecRegistry,
        value: Self::Value,
    ) -> Result<StoredRecord, CodecError> {
        let id = Self::key_of(&value);
        let indexes = Self::index_fields(&value);
        let (type_tag, payload) = codec.encode(&Self::wrap(value))?;
        Ok(StoredRecord {
            id,
            version: 0,
            type_tag,
            payload,
            indexes,
        })
    }

    fn decode(
        codec: &CodecRegistry,
        record: &StoredRecord,
    ) -> Result<Self::Value, CodecError> {
        let payload =
            codec.decode(Self::KIND, &record.type_tag, &record.payload)?;
        Self::unwrap(payload).ok_or_else(|| CodecError::UnexpectedPayload {
            kind: Self::KIND,
            tag: record.type_tag.clone(),
        })
    }
}

#[derive(Debug)]
pub struct JobAdapter;

impl RecordAdapter for JobAdapter {
    type Key = JobKey;
    type Value = JobDetail;

    const KIND: RecordKind = RecordKind::Job;

    fn record_id(key: &JobKey) -> RecordId {
        RecordId::new(Self::KIND, key.name.as_str(), key.group.as_str())
    }

    fn key_of(value: &JobDetail) -> RecordId {
        Self::record_id(&value.key)
    }

    fn index_fields(value: &JobDetail) -> BTreeMap<IndexField, String> {
        BTreeMap::from([(IndexField::Group, value.key.group.clone())])
    }

    fn wrap(value: JobDetail) -> EntityPayload {
        EntityPayload::Job(value)
    }

    fn unwrap(payload: EntityPayload) -> Option<JobDetail> {
        match payload {
            EntityPayload::Job(job) => Some(job),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TriggerAdapter;

impl RecordAdapter for TriggerAdapter {
    type Key = TriggerKey;
    type Value = TriggerRecord;

    const KIND: RecordKind = RecordKind::Trigger;

    fn record_id(key: &TriggerKey) -> RecordId {
        RecordId::new(Self::KIND, key.name.as_str(), key.group.as_str())
    }

    fn key_of(value: &TriggerRecord) -> RecordId {
        Self::record_id(&value.trigger.key)
    }

    fn index_fields(value: &TriggerRecord) -> BTreeMap<IndexField, String> {
        let trigger = &value.trigger;
        let mut fields = BTreeMap::from([
            (IndexField::Group, trigger.key.group.clone()),
            (IndexField::State, value.state.as_str().to_string()),
            (IndexField::JobKey, job_index_value(&trigger.job_key)),
        ]);
        if let Some(calendar) = &trigger.calendar_name {
            fields.insert(IndexField::CalendarName, calendar.clone());
        }
        fields
    }

    fn wrap(value: TriggerRecord) -> EntityPayload {
        EntityPayload::Trigger(value)
    }

    fn unwrap(payload: EntityPayload) -> Option<TriggerRecord> {
        match payload {
            EntityPayload::Trigger(record) => Some(record),
            _ => None,
        }
    }
}

/// A calendar together with the name it is stored under.
#[derive(Debug, Clone)]
pub struct NamedCalendar {
    pub name: String,
    pub calendar: Arc<dyn Calendar>,
}

#[derive(Debug)]
pub struct CalendarAdapter;

impl RecordAdapter for CalendarAdapter {
    type Key = String;
    type Value = NamedCalendar;

    const KIND: RecordKind = RecordKind::Calendar;

    fn record_id(key: &String) -> RecordId {
        RecordId::new(Self::KIND, key.as_str(), "")
    }

    fn key_of(value: &NamedCalendar) -> RecordId {
        Self::record_id(&value.name)
    }

    fn index_fields(_: &NamedCalendar) -> BTreeMap<IndexField, String> {
        BTreeMap::new()
    }

    fn wrap(value: NamedCalendar) -> EntityPayload {
        EntityPayload::Calendar(value.calendar)
    }

    fn unwrap(_: EntityPayload) -> Option<NamedCalendar> {
        // The name lives in the record id, not in the payload.
        None
    }

    fn decode(
        codec: &CodecRegistry,
        record: &StoredRecord,
    ) -> Result<NamedCalendar, CodecError> {
        match codec.decode(Self::KIND, &record.type_tag, &record.payload)? {
            EntityPayload::Calendar(calendar) => Ok(NamedCalendar {
                name: record.id.name.clone(),
                calendar,
            }),
            _ => Err(CodecError::UnexpectedPayload {
                kind: Self::KIND,
                tag: record.type_tag.clone(),
            }),
        }
    }
}
