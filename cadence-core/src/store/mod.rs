//! Transactional document store seam.
//!
//! The coordinator only talks to storage through [`DocumentStore`] and
//! [`StoreTransaction`]. Records are opaque `type tag + JSON` payloads with
//! a handful of string index fields; the typed view lives in [`adapters`].

pub mod adapters;
pub mod codec;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub use adapters::{CalendarAdapter, JobAdapter, RecordAdapter, TriggerAdapter};
pub use codec::{CodecRegistry, EntityPayload, TriggerRecord};
pub use memory::MemoryDocumentStore;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Job,
    Trigger,
    Calendar,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Job => "job",
            RecordKind::Trigger => "trigger",
            RecordKind::Calendar => "calendar",
        };
        f.write_str(label)
    }
}

/// Natural key of a stored record. Calendars use an empty group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub kind: RecordKind,
    pub name: String,
    pub group: String,
}

impl RecordId {
    pub fn new(
        kind: RecordKind,
        name: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            group: group.into(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}.{}", self.kind, self.group, self.name)
        }
    }
}

/// Secondary index columns maintained by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexField {
    Group,
    State,
    JobKey,
    CalendarName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    /// Commit revision that last wrote the record; assigned by the store.
    pub version: u64,
    pub type_tag: String,
    pub payload: String,
    pub indexes: BTreeMap<IndexField, String>,
}

impl StoredRecord {
    pub fn index(&self, field: IndexField) -> Option<&str> {
        self.indexes.get(&field).map(String::as_str)
    }
}

/// Effect of a committed transaction on one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    Created(RecordId),
    Updated(RecordId),
    Deleted(RecordId),
}

impl RecordChange {
    pub fn id(&self) -> &RecordId {
        match self {
            RecordChange::Created(id)
            | RecordChange::Updated(id)
            | RecordChange::Deleted(id) => id,
        }
    }
}

/// Storage engine able to open transactions.
pub trait DocumentStore: Send + Sync + fmt::Debug {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}

/// A unit of work against a [`DocumentStore`]. Dropping it without calling
/// [`StoreTransaction::commit`] rolls it back.
pub trait StoreTransaction: Send {
    fn get(&mut self, id: &RecordId) -> StoreResult<Option<StoredRecord>>;

    fn browse(&mut self, kind: RecordKind) -> StoreResult<Vec<StoredRecord>>;

    fn browse_index(
        &mut self,
        kind: RecordKind,
        field: IndexField,
        value: &str,
    ) -> StoreResult<Vec<StoredRecord>>;

    /// Fails with [`crate::StoreError::Duplicate`] when the key is taken.
    fn insert(&mut self, record: StoredRecord) -> StoreResult<()>;

    /// Fails with [`crate::StoreError::RecordVanished`] when the key is absent.
    fn update(&mut self, record: StoredRecord) -> StoreResult<()>;

    /// Returns whether a record was deleted.
    fn delete(&mut self, id: &RecordId) -> StoreResult<bool>;

    fn commit(self: Box<Self>) -> StoreResult<Vec<RecordChange>>;

    fn exists(&mut self, id: &RecordId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    fn count(&mut self, kind: RecordKind) -> StoreResult<usize> {
        Ok(self.browse(kind)?.len())
    }

    /// Full scan of one record kind filtered by `predicate`.
    fn scan(
        &mut self,
        kind: RecordKind,
        predicate: &dyn Fn(&StoredRecord) -> bool,
    ) -> StoreResult<Vec<StoredRecord>> {
        Ok(self
            .browse(kind)?
            .into_iter()
            .filter(|record| predicate(record))
            .collect())
    }
}
