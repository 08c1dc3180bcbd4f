use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use cadence_model::{
    Calendar, GroupMatcher, JobDetail, JobKey, Trigger, TriggerKey, TriggerState,
};

use crate::cluster::Locality;
use crate::config::JobStoreConfig;
use crate::error::{JobStoreError, Result};
use crate::signaler::PendingSignal;
use crate::store::adapters::{NamedCalendar, job_index_value};
use crate::store::{
    CalendarAdapter, CodecRegistry, IndexField, JobAdapter, RecordAdapter, RecordChange,
    RecordKind, StoreTransaction, StoredRecord, TriggerAdapter, TriggerRecord,
};

/// Outcome of one successfully committed attempt.
#[derive(Debug)]
pub(crate) struct Committed<T> {
    pub value: T,
    pub signals: Vec<PendingSignal>,
    pub changes: Vec<RecordChange>,
}

/// Everything a coordinator operation can touch during one attempt.
///
/// Typed record access sits here; the operations themselves are spread
/// over the sibling modules as further `impl TxContext` blocks.
pub(crate) struct TxContext<'a> {
    tx: Box<dyn StoreTransaction + 'a>,
    codec: &'a CodecRegistry,
    pub(crate) locality: Locality,
    pub(crate) config: &'a JobStoreConfig,
    pub(crate) now: DateTime<Utc>,
    signals: Vec<PendingSignal>,
}

impl<'a> TxContext<'a> {
    pub(crate) fn new(
        tx: Box<dyn StoreTransaction + 'a>,
        codec: &'a CodecRegistry,
        locality: Locality,
        config: &'a JobStoreConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx,
            codec,
            locality,
            config,
            now,
            signals: Vec::new(),
        }
    }

    pub(crate) fn commit<T>(self, value: T) -> Result<Committed<T>> {
        let changes = self.tx.commit()?;
        Ok(Committed {
            value,
            signals: self.signals,
            changes,
        })
    }

    /// Queues a signal for delivery once the transaction commits.
    pub(crate) fn signal(&mut self, signal: PendingSignal) {
        trace!(?signal, "signal buffered");
        self.signals.push(signal);
    }

    /// Latest next-fire-time that still counts as on time, clamped at the epoch.
    pub(crate) fn misfire_time(&self) -> DateTime<Utc> {
        let threshold = self.config.misfire_threshold();
        self.now
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .max(DateTime::<Utc>::UNIX_EPOCH)
    }

    // Jobs

    pub(crate) fn read_job(&mut self, key: &JobKey) -> Result<Option<JobDetail>> {
        match self.tx.get(&JobAdapter::record_id(key))? {
            Some(record) => Ok(Some(JobAdapter::decode(self.codec, &record)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn job_exists(&mut self, key: &JobKey) -> Result<bool> {
        Ok(self.tx.exists(&JobAdapter::record_id(key))?)
    }

    pub(crate) fn insert_job(&mut self, job: JobDetail) -> Result<()> {
        let record = JobAdapter::encode(self.codec, job)?;
        self.tx.insert(record)?;
        Ok(())
    }

    pub(crate) fn update_job(&mut self, job: JobDetail) -> Result<()> {
        let record = JobAdapter::encode(self.codec, job)?;
        self.tx.update(record)?;
        Ok(())
    }

    pub(crate) fn delete_job(&mut self, key: &JobKey) -> Result<bool> {
        Ok(self.tx.delete(&JobAdapter::record_id(key))?)
    }

    pub(crate) fn count(&mut self, kind: RecordKind) -> Result<usize> {
        Ok(self.tx.count(kind)?)
    }

    // Triggers

    pub(crate) fn read_trigger(&mut self, key: &TriggerKey) -> Result<Option<TriggerRecord>> {
        match self.tx.get(&TriggerAdapter::record_id(key))? {
            Some(record) => Ok(Some(TriggerAdapter::decode(self.codec, &record)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn trigger_exists(&mut self, key: &TriggerKey) -> Result<bool> {
        Ok(self.tx.exists(&TriggerAdapter::record_id(key))?)
    }

    pub(crate) fn insert_trigger(&mut self, trigger: Trigger, state: TriggerState) -> Result<()> {
        let record = TriggerAdapter::encode(self.codec, TriggerRecord { trigger, state })?;
        self.tx.insert(record)?;
        Ok(())
    }

    pub(crate) fn save_trigger(&mut self, record: &TriggerRecord) -> Result<()> {
        let encoded = TriggerAdapter::encode(self.codec, record.clone())?;
        self.tx.update(encoded)?;
        Ok(())
    }

    pub(crate) fn set_trigger_state(
        &mut self,
        record: &mut TriggerRecord,
        state: TriggerState,
    ) -> Result<()> {
        trace!(trigger = %record.trigger.key, from = %record.state, to = %state, "trigger state");
        record.state = state;
        self.save_trigger(record)
    }

    pub(crate) fn delete_trigger(&mut self, key: &TriggerKey) -> Result<bool> {
        Ok(self.tx.delete(&TriggerAdapter::record_id(key))?)
    }

    pub(crate) fn all_triggers(&mut self) -> Result<Vec<TriggerRecord>> {
        let records = self.tx.browse(RecordKind::Trigger)?;
        self.decode_triggers(&records)
    }

    pub(crate) fn triggers_in_state(&mut self, state: TriggerState) -> Result<Vec<TriggerRecord>> {
        let records =
            self.tx
                .browse_index(RecordKind::Trigger, IndexField::State, state.as_str())?;
        self.decode_triggers(&records)
    }

    pub(crate) fn triggers_in_group(&mut self, group: &str) -> Result<Vec<TriggerRecord>> {
        let records = self
            .tx
            .browse_index(RecordKind::Trigger, IndexField::Group, group)?;
        self.decode_triggers(&records)
    }

    pub(crate) fn triggers_of_job(&mut self, key: &JobKey) -> Result<Vec<TriggerRecord>> {
        let records = self.tx.browse_index(
            RecordKind::Trigger,
            IndexField::JobKey,
            &job_index_value(key),
        )?;
        self.decode_triggers(&records)
    }

    pub(crate) fn triggers_with_calendar(&mut self, name: &str) -> Result<Vec<TriggerRecord>> {
        let records =
            self.tx
                .browse_index(RecordKind::Trigger, IndexField::CalendarName, name)?;
        self.decode_triggers(&records)
    }

    fn records_in_groups(
        &mut self,
        kind: RecordKind,
        matcher: &GroupMatcher,
    ) -> Result<Vec<StoredRecord>> {
        let records = match matcher {
            GroupMatcher::Equals(group) => {
                self.tx.browse_index(kind, IndexField::Group, group)?
            }
            _ => self.tx.scan(kind, &|record: &StoredRecord| {
                record
                    .index(IndexField::Group)
                    .is_some_and(|group| matcher.is_match(group))
            })?,
        };
        Ok(records)
    }

    pub(crate) fn jobs_matching(&mut self, matcher: &GroupMatcher) -> Result<Vec<JobDetail>> {
        self.records_in_groups(RecordKind::Job, matcher)?
            .iter()
            .map(|record| Ok(JobAdapter::decode(self.codec, record)?))
            .collect()
    }

    pub(crate) fn triggers_matching(
        &mut self,
        matcher: &GroupMatcher,
    ) -> Result<Vec<TriggerRecord>> {
        let records = self.records_in_groups(RecordKind::Trigger, matcher)?;
        self.decode_triggers(&records)
    }

    /// Group names of one record kind, found with a full predicate scan.
    pub(crate) fn group_names(&mut self, kind: RecordKind) -> Result<Vec<String>> {
        let records = self.tx.scan(kind, &|record: &StoredRecord| {
            record.index(IndexField::Group).is_some()
        })?;
        let mut groups: Vec<String> = records
            .iter()
            .filter_map(|record| record.index(IndexField::Group).map(str::to_string))
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    fn decode_triggers(
        &self,
        records: &[StoredRecord],
    ) -> Result<Vec<TriggerRecord>> {
        records
            .iter()
            .map(|record| Ok(TriggerAdapter::decode(self.codec, record)?))
            .collect()
    }

    // Calendars

    pub(crate) fn find_calendar(&mut self, name: &str) -> Result<Option<Arc<dyn Calendar>>> {
        match self.tx.get(&CalendarAdapter::record_id(&name.to_string()))? {
            Some(record) => Ok(Some(CalendarAdapter::decode(self.codec, &record)?.calendar)),
            None => Ok(None),
        }
    }

    pub(crate) fn calendar_of(&mut self, trigger: &Trigger) -> Result<Option<Arc<dyn Calendar>>> {
        match &trigger.calendar_name {
            Some(name) => self.find_calendar(name),
            None => Ok(None),
        }
    }

    pub(crate) fn put_calendar(
        &mut self,
        name: &str,
        calendar: Arc<dyn Calendar>,
        replace: bool,
    ) -> Result<bool> {
        let record = CalendarAdapter::encode(
            self.codec,
            NamedCalendar {
                name: name.to_string(),
                calendar,
            },
        )?;
        if self.tx.exists(&record.id)? {
            if replace {
                self.tx.update(record)?;
            }
            Ok(false)
        } else {
            self.tx.insert(record)?;
            Ok(true)
        }
    }

    pub(crate) fn delete_calendar(&mut self, name: &str) -> Result<bool> {
        Ok(self.tx.delete(&CalendarAdapter::record_id(&name.to_string()))?)
    }

    pub(crate) fn calendar_names(&mut self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tx
            .browse(RecordKind::Calendar)?
            .into_iter()
            .map(|record| record.id.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub(crate) fn delete_all(&mut self, kind: RecordKind) -> Result<usize> {
        let records = self.tx.browse(kind)?;
        let mut deleted = 0;
        for record in records {
            if self.tx.delete(&record.id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl JobStoreError {
    pub(crate) fn already_exists(kind: RecordKind, key: impl ToString) -> Self {
        JobStoreError::ObjectAlreadyExists {
            kind,
            key: key.to_string(),
        }
    }
}
