use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::{
    DocumentStore, IndexField, RecordChange, RecordId, RecordKind, StoreTransaction,
    StoredRecord,
};
use crate::error::{StoreError, StoreResult};

type IndexKey = (RecordKind, IndexField, String);

#[derive(Debug, Clone, Default)]
struct Tables {
    /// Monotonic commit counter; every written record takes the new value.
    revision: u64,
    records: BTreeMap<RecordId, StoredRecord>,
    indexes: HashMap<IndexKey, BTreeSet<RecordId>>,
    /// Bumped whenever a record of the kind is created or deleted.
    generations: HashMap<RecordKind, u64>,
}

impl Tables {
    fn generation(&self, kind: RecordKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or(0)
    }

    fn unindex(&mut self, record: &StoredRecord) {
        for (field, value) in &record.indexes {
            let key = (record.id.kind, *field, value.clone());
            if let Some(ids) = self.indexes.get_mut(&key) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.indexes.remove(&key);
                }
            }
        }
    }

    fn index(&mut self, record: &StoredRecord) {
        for (field, value) in &record.indexes {
            self.indexes
                .entry((record.id.kind, *field, value.clone()))
                .or_default()
                .insert(record.id.clone());
        }
    }
}

/// In-memory document store with snapshot reads and optimistic,
/// first-committer-wins commits.
///
/// Several coordinators can share one instance to behave like the nodes of
/// a cluster pointed at the same database.
pub struct MemoryDocumentStore {
    tables: RwLock<Arc<Tables>>,
}

impl fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MemoryDocumentStore");
        if let Ok(tables) = self.tables.read() {
            debug
                .field("revision", &tables.revision)
                .field("records", &tables.records.len());
        }
        debug.finish()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Arc::new(Tables::default())),
        }
    }

    fn snapshot(&self) -> StoreResult<Arc<Tables>> {
        self.tables
            .read()
            .map(|tables| Arc::clone(&tables))
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            snapshot: self.snapshot()?,
            reads: HashMap::new(),
            scanned: HashMap::new(),
            writes: BTreeMap::new(),
        }))
    }
}

#[derive(Debug)]
enum PendingWrite {
    Put(StoredRecord),
    Delete,
}

struct MemoryTransaction<'a> {
    store: &'a MemoryDocumentStore,
    snapshot: Arc<Tables>,
    /// Version of every record observed, `None` when observed absent.
    reads: HashMap<RecordId, Option<u64>>,
    /// Kind generations observed by range reads.
    scanned: HashMap<RecordKind, u64>,
    writes: BTreeMap<RecordId, PendingWrite>,
}

impl MemoryTransaction<'_> {
    fn observe(&mut self, id: &RecordId) -> Option<StoredRecord> {
        let committed = self.snapshot.records.get(id);
        self.reads
            .entry(id.clone())
            .or_insert_with(|| committed.map(|record| record.version));
        committed.cloned()
    }

    fn observe_kind(&mut self, kind: RecordKind) {
        let generation = self.snapshot.generation(kind);
        self.scanned.entry(kind).or_insert(generation);
    }

    /// Applies pending writes of `kind` on top of `base`, dropping deletes.
    fn overlay(
        &self,
        kind: RecordKind,
        mut base: BTreeMap<RecordId, StoredRecord>,
        matches: impl Fn(&StoredRecord) -> bool,
    ) -> Vec<StoredRecord> {
        for (id, write) in self.writes.iter().filter(|(id, _)| id.kind == kind) {
            match write {
                PendingWrite::Put(record) if matches(record) => {
                    base.insert(id.clone(), record.clone());
                }
                PendingWrite::Put(_) | PendingWrite::Delete => {
                    base.remove(id);
                }
            }
        }
        base.into_values().collect()
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get(&mut self, id: &RecordId) -> StoreResult<Option<StoredRecord>> {
        match self.writes.get(id) {
            Some(PendingWrite::Put(record)) => Ok(Some(record.clone())),
            Some(PendingWrite::Delete) => Ok(None),
            None => Ok(self.observe(id)),
        }
    }

    fn browse(&mut self, kind: RecordKind) -> StoreResult<Vec<StoredRecord>> {
        self.observe_kind(kind);
        let base: BTreeMap<RecordId, StoredRecord> = self
            .snapshot
            .records
            .iter()
            .filter(|(id, _)| id.kind == kind)
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        for id in base.keys() {
            self.observe(id);
        }
        Ok(self.overlay(kind, base, |_| true))
    }

    fn browse_index(
        &mut self,
        kind: RecordKind,
        field: IndexField,
        value: &str,
    ) -> StoreResult<Vec<StoredRecord>> {
        self.observe_kind(kind);
        let ids: Vec<RecordId> = self
            .snapshot
            .indexes
            .get(&(kind, field, value.to_string()))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let mut base = BTreeMap::new();
        for id in ids {
            if let Some(record) = self.observe(&id) {
                base.insert(id, record);
            }
        }
        Ok(self.overlay(kind, base, |record| record.index(field) == Some(value)))
    }

    fn insert(&mut self, mut record: StoredRecord) -> StoreResult<()> {
        if self.get(&record.id)?.is_some() {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        record.version = 0;
        self.writes
            .insert(record.id.clone(), PendingWrite::Put(record));
        Ok(())
    }

    fn update(&mut self, mut record: StoredRecord) -> StoreResult<()> {
        let Some(existing) = self.get(&record.id)? else {
            return Err(StoreError::RecordVanished(record.id.to_string()));
        };
        record.version = existing.version;
        self.writes
            .insert(record.id.clone(), PendingWrite::Put(record));
        Ok(())
    }

    fn delete(&mut self, id: &RecordId) -> StoreResult<bool> {
        if self.get(id)?.is_none() {
            return Ok(false);
        }
        self.writes.insert(id.clone(), PendingWrite::Delete);
        Ok(true)
    }

    fn commit(self: Box<Self>) -> StoreResult<Vec<RecordChange>> {
        let this = *self;
        if this.writes.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = this
            .store
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
        let current = Arc::clone(&guard);

        for (id, seen) in &this.reads {
            let now = current.records.get(id).map(|record| record.version);
            if now != *seen {
                return Err(StoreError::Conflict(id.to_string()));
            }
        }
        for (kind, seen) in &this.scanned {
            if current.generation(*kind) != *seen {
                return Err(StoreError::Conflict(format!("{kind} set")));
            }
        }

        let mut next = (*current).clone();
        next.revision += 1;
        let revision = next.revision;
        let mut changes = Vec::with_capacity(this.writes.len());

        for (id, write) in this.writes {
            let previous = next.records.remove(&id);
            if let Some(previous) = &previous {
                next.unindex(previous);
            }
            match (write, previous) {
                (PendingWrite::Put(mut record), previous) => {
                    record.version = revision;
                    next.index(&record);
                    next.records.insert(id.clone(), record);
                    if previous.is_some() {
                        changes.push(RecordChange::Updated(id));
                    } else {
                        *next.generations.entry(id.kind).or_insert(0) += 1;
                        changes.push(RecordChange::Created(id));
                    }
                }
                (PendingWrite::Delete, Some(_)) => {
                    *next.generations.entry(id.kind).or_insert(0) += 1;
                    changes.push(RecordChange::Deleted(id));
                }
                (PendingWrite::Delete, None) => {}
            }
        }

        *guard = Arc::new(next);
        trace!(revision, changes = changes.len(), "memory store commit");
        Ok(changes)
    }
}
