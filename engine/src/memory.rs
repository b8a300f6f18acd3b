//! In-memory storage backend.
//!
//! Holds one entry per scope in a sharded concurrent map. A write locks its
//! scope's entry for the whole check-then-write sequence, which makes each
//! write atomic and keeps timestamp allocation monotonic under concurrent
//! writers. Reads and writes of different scopes never touch the same entry.
//!
//! Scopes only get an entry on their first write. Timestamp reads of scopes
//! without one are answered from a storage-wide baseline, and a scope's first
//! write is stamped above that baseline.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{now_millis, ScopeClock};
use crate::error::Result;
use crate::filter::{compare_values, matches_all, Filter};
use crate::id::{IdGenerator, UuidGenerator};
use crate::query::{extract_record_set, Query};
use crate::snapshot::MemorySnapshot;
use crate::storage::{Auth, Scope, Storage};
use crate::{Error, FieldNames, Record, RecordId, Timestamp};

/// Source of wall-clock milliseconds.
pub type TimeSource = Arc<dyn Fn() -> Timestamp + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopeKey {
    resource_name: String,
    parent_id: String,
}

impl From<Scope<'_>> for ScopeKey {
    fn from(scope: Scope<'_>) -> Self {
        Self {
            resource_name: scope.resource_name.to_owned(),
            parent_id: scope.parent_id.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Live(Record),
    /// Deleted record, only its deletion timestamp is kept
    Tombstone(Timestamp),
}

#[derive(Debug, Default)]
struct ScopeState {
    clock: ScopeClock,
    entries: BTreeMap<RecordId, Entry>,
}

impl ScopeState {
    /// Allocate the timestamp of a write, `Error::TimestampOverflow` once the
    /// scope clock is exhausted.
    fn tick(&mut self, now: Timestamp, scope: Scope<'_>) -> Result<Timestamp> {
        self.clock.tick(now).ok_or_else(|| overflow(scope))
    }

    fn live(&self, record_id: &str) -> Option<&Record> {
        match self.entries.get(record_id) {
            Some(Entry::Live(record)) => Some(record),
            _ => None,
        }
    }

    /// Reject `candidate` if another live record shares its values for all
    /// of `unique_fields`.
    fn check_unique(
        &self,
        candidate: &Record,
        unique_fields: &[&str],
        own_id: Option<&str>,
    ) -> Result<()> {
        if unique_fields.is_empty() {
            return Ok(());
        }

        let mut values = Vec::with_capacity(unique_fields.len());
        for field in unique_fields {
            match candidate.get(field) {
                None | Some(Value::Null) => return Ok(()),
                Some(value) => values.push(value),
            }
        }

        let clash = self.entries.iter().find_map(|(id, entry)| match entry {
            Entry::Live(existing) if Some(id.as_str()) != own_id => {
                let same = unique_fields.iter().zip(&values).all(|(field, value)| {
                    existing
                        .get(field)
                        .is_some_and(|v| compare_values(v, value).is_eq())
                });
                same.then_some(existing)
            }
            _ => None,
        });

        match clash {
            Some(existing) => Err(Error::unique_violation(
                unique_fields.iter().copied(),
                existing.clone(),
            )),
            None => Ok(()),
        }
    }
}

fn overflow(scope: Scope<'_>) -> Error {
    Error::TimestampOverflow {
        resource_name: scope.resource_name.to_owned(),
        parent_id: scope.parent_id.to_owned(),
    }
}

/// Reference [`Storage`] implementation keeping everything in process memory.
pub struct MemoryStorage {
    scopes: DashMap<ScopeKey, ScopeState>,
    /// Highest timestamp handed out for scopes without state, 0 if none
    baseline: AtomicU64,
    id_generator: Arc<dyn IdGenerator>,
    now: TimeSource,
}

impl MemoryStorage {
    /// Create an empty storage generating UUIDv4 ids and reading wall time.
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
            baseline: AtomicU64::new(0),
            id_generator: Arc::new(UuidGenerator),
            now: Arc::new(now_millis),
        }
    }

    /// Default generator used when a create call brings none.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Replace the wall clock, e.g. with a frozen one in tests.
    pub fn with_time_source<F>(mut self, now: F) -> Self
    where
        F: Fn() -> Timestamp + Send + Sync + 'static,
    {
        self.now = Arc::new(now);
        self
    }

    /// Number of scopes holding state.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// State for a scope about to be written for the first time.
    fn fresh_state(&self) -> ScopeState {
        let clock = match self.baseline.load(Ordering::SeqCst) {
            0 => ScopeClock::new(),
            floor => ScopeClock::with_timestamp(floor),
        };
        ScopeState {
            clock,
            entries: BTreeMap::new(),
        }
    }

    /// Export every scope as a snapshot.
    pub fn export_state(&self) -> MemorySnapshot {
        let mut snapshot = MemorySnapshot::new();

        for item in self.scopes.iter() {
            let (key, state) = item.pair();
            let scope = snapshot.scope_mut(&key.resource_name, &key.parent_id);
            scope.timestamp = state.clock.current();

            for (id, entry) in &state.entries {
                match entry {
                    Entry::Live(record) => {
                        scope.records.insert(id.clone(), record.clone());
                    }
                    Entry::Tombstone(ts) => {
                        scope.tombstones.insert(id.clone(), *ts);
                    }
                }
            }
        }

        snapshot
    }

    /// Replace the whole content of this storage with a snapshot whose
    /// records follow the `fields` conventions.
    pub fn import_state(&self, snapshot: MemorySnapshot, fields: &FieldNames) -> Result<()> {
        snapshot.validate(fields)?;

        let mut restored = Vec::new();
        for (resource_name, parents) in snapshot.scopes {
            for (parent_id, scope) in parents {
                let mut state = ScopeState::default();
                if let Some(ts) = scope.timestamp {
                    state.clock.merge(ts);
                }
                for (id, record) in scope.records {
                    state.entries.insert(id, Entry::Live(record));
                }
                for (id, ts) in scope.tombstones {
                    state.clock.merge(ts);
                    state.entries.insert(id, Entry::Tombstone(ts));
                }
                restored.push((
                    ScopeKey {
                        resource_name: resource_name.clone(),
                        parent_id,
                    },
                    state,
                ));
            }
        }

        self.scopes.clear();
        for (key, state) in restored {
            self.scopes.insert(key, state);
        }

        tracing::debug!(scopes = self.scopes.len(), "memory storage state imported");
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("scopes", &self.scopes.len())
            .field("id_generator", &self.id_generator)
            .finish_non_exhaustive()
    }
}

/// Stamp a record for storage: set its id and timestamp, drop any deletion
/// marker the caller sent.
fn stamp(mut record: Record, record_id: &str, timestamp: Timestamp, fields: &FieldNames) -> Record {
    record.remove(&fields.deleted);
    record.set_id(fields, record_id);
    record.set_last_modified(fields, timestamp);
    record
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn collection_timestamp(
        &self,
        scope: Scope<'_>,
        _auth: Option<&Auth>,
    ) -> Result<Timestamp> {
        let now = (self.now)();
        if let Some(mut state) = self.scopes.get_mut(&ScopeKey::from(scope)) {
            return Ok(state.clock.read(now));
        }
        let previous = self.baseline.fetch_max(now, Ordering::SeqCst);
        Ok(previous.max(now))
    }

    async fn get_all(
        &self,
        scope: Scope<'_>,
        query: &Query,
        fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<(Vec<Record>, usize)> {
        let Some(state) = self.scopes.get(&ScopeKey::from(scope)) else {
            return Ok((Vec::new(), 0));
        };

        let candidates = state.entries.iter().filter_map(|(id, entry)| match entry {
            Entry::Live(record) => Some(Cow::Borrowed(record)),
            Entry::Tombstone(ts) if query.include_deleted => {
                Some(Cow::Owned(Record::tombstone(id.clone(), *ts, fields)))
            }
            Entry::Tombstone(_) => None,
        });

        Ok(extract_record_set(candidates, query, fields))
    }

    async fn get(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        _fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<Record> {
        self.scopes
            .get(&ScopeKey::from(scope))
            .and_then(|state| state.live(record_id).cloned())
            .ok_or_else(|| Error::not_found(scope.resource_name, record_id))
    }

    async fn create(
        &self,
        scope: Scope<'_>,
        record: Record,
        id_generator: Option<&dyn IdGenerator>,
        unique_fields: &[&str],
        fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<Record> {
        let record_id = match record.checked_id(fields)? {
            Some(id) => id.to_owned(),
            None => match id_generator {
                Some(generator) => generator.generate(),
                None => self.id_generator.generate(),
            },
        };

        let now = (self.now)();
        let mut state = self
            .scopes
            .entry(scope.into())
            .or_insert_with(|| self.fresh_state());

        if let Some(existing) = state.live(&record_id) {
            tracing::debug!(
                resource = scope.resource_name,
                record_id = %record_id,
                "create rejected, id already in use"
            );
            return Err(Error::unique_violation([fields.id.as_str()], existing.clone()));
        }
        state.check_unique(&record, unique_fields, None)?;

        let timestamp = state.tick(now, scope)?;
        let record = stamp(record, &record_id, timestamp, fields);
        state.entries.insert(record_id.clone(), Entry::Live(record.clone()));

        tracing::trace!(
            resource = scope.resource_name,
            parent_id = scope.parent_id,
            record_id = %record_id,
            timestamp,
            "record created"
        );
        Ok(record)
    }

    async fn update(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        record: Record,
        unique_fields: &[&str],
        fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<Record> {
        let now = (self.now)();
        let Some(mut state) = self.scopes.get_mut(&ScopeKey::from(scope)) else {
            return Err(Error::not_found(scope.resource_name, record_id));
        };
        if state.live(record_id).is_none() {
            return Err(Error::not_found(scope.resource_name, record_id));
        }
        state.check_unique(&record, unique_fields, Some(record_id))?;

        let timestamp = state.tick(now, scope)?;
        let record = stamp(record, record_id, timestamp, fields);
        state
            .entries
            .insert(record_id.to_owned(), Entry::Live(record.clone()));

        tracing::trace!(
            resource = scope.resource_name,
            parent_id = scope.parent_id,
            record_id,
            timestamp,
            "record updated"
        );
        Ok(record)
    }

    async fn delete(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<Record> {
        let now = (self.now)();
        let Some(mut state) = self.scopes.get_mut(&ScopeKey::from(scope)) else {
            return Err(Error::not_found(scope.resource_name, record_id));
        };
        if state.live(record_id).is_none() {
            return Err(Error::not_found(scope.resource_name, record_id));
        }

        let timestamp = state.tick(now, scope)?;
        state
            .entries
            .insert(record_id.to_owned(), Entry::Tombstone(timestamp));

        tracing::trace!(
            resource = scope.resource_name,
            parent_id = scope.parent_id,
            record_id,
            timestamp,
            "record deleted"
        );
        Ok(Record::tombstone(record_id, timestamp, fields))
    }

    async fn delete_all(
        &self,
        scope: Scope<'_>,
        filters: &[Filter],
        fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<Vec<Record>> {
        let now = (self.now)();
        let Some(mut state) = self.scopes.get_mut(&ScopeKey::from(scope)) else {
            return Ok(Vec::new());
        };

        let filters: Vec<Filter> = filters.iter().map(|f| f.normalized(fields)).collect();
        let doomed: Vec<RecordId> = state
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Live(record) if matches_all(&filters, record) => Some(id.clone()),
                _ => None,
            })
            .collect();

        // Allocate every timestamp before touching entries, so an exhausted
        // clock leaves the scope unchanged.
        let mut clock = state.clock;
        let stamps = doomed
            .iter()
            .map(|_| clock.tick(now).ok_or_else(|| overflow(scope)))
            .collect::<Result<Vec<_>>>()?;
        state.clock = clock;

        let mut tombstones = Vec::with_capacity(doomed.len());
        for (id, timestamp) in doomed.into_iter().zip(stamps) {
            state.entries.insert(id.clone(), Entry::Tombstone(timestamp));
            tombstones.push(Record::tombstone(id, timestamp, fields));
        }

        tracing::trace!(
            resource = scope.resource_name,
            parent_id = scope.parent_id,
            deleted = tombstones.len(),
            "records deleted"
        );
        Ok(tombstones)
    }

    async fn purge_deleted(
        &self,
        scope: Scope<'_>,
        before: Option<Timestamp>,
        _fields: &FieldNames,
        _auth: Option<&Auth>,
    ) -> Result<usize> {
        let Some(mut state) = self.scopes.get_mut(&ScopeKey::from(scope)) else {
            return Ok(0);
        };

        let count = state.entries.len();
        state.entries.retain(|_, entry| match entry {
            Entry::Live(_) => true,
            Entry::Tombstone(ts) => before.is_some_and(|before| *ts >= before),
        });
        Ok(count - state.entries.len())
    }

    async fn flush(&self, _auth: Option<&Auth>) -> Result<()> {
        self.scopes.clear();
        tracing::debug!("memory storage flushed");
        Ok(())
    }
}
