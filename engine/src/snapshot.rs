//! Snapshot types for persisting and restoring in-memory storage.
//!
//! Snapshots are the bridge between [`crate::MemoryStorage`] and a file or
//! blob store. They use `BTreeMap` throughout so serialization is
//! deterministic.

use crate::{error::Result, Error, FieldNames, ParentId, Record, RecordId, ResourceName, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// State of a single `(name, parent_id)` scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSnapshot {
    /// Scope timestamp, `None` if the scope was never written
    pub timestamp: Option<Timestamp>,
    /// Live records by id
    #[serde(default)]
    pub records: BTreeMap<RecordId, Record>,
    /// Deletion timestamps of tombstones by id
    #[serde(default)]
    pub tombstones: BTreeMap<RecordId, Timestamp>,
}

impl ScopeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.tombstones.is_empty()
    }

    fn validate(&self, resource_name: &str, parent_id: &str, fields: &FieldNames) -> Result<()> {
        let invalid = |reason: String| {
            Error::InvalidSnapshot(format!("scope {resource_name}/{parent_id:?}: {reason}"))
        };

        if let Some(id) = self.records.keys().find(|id| self.tombstones.contains_key(*id)) {
            return Err(invalid(format!("record {id} is both live and deleted")));
        }

        let Some(timestamp) = self.timestamp else {
            if self.is_empty() {
                return Ok(());
            }
            return Err(invalid("missing timestamp".into()));
        };

        for (id, record) in &self.records {
            if record.id(fields) != Some(id.as_str()) {
                return Err(invalid(format!("record {id} carries another '{}'", fields.id)));
            }
            match record.last_modified(fields) {
                None => {
                    return Err(invalid(format!("record {id} has no '{}'", fields.modified)));
                }
                Some(ts) if ts > timestamp => {
                    return Err(invalid(format!(
                        "record {id} at {ts} is ahead of scope timestamp {timestamp}"
                    )));
                }
                Some(_) => {}
            }
        }

        match self.tombstones.iter().find(|(_, ts)| **ts > timestamp) {
            Some((id, ts)) => Err(invalid(format!(
                "tombstone {id} at {ts} is ahead of scope timestamp {timestamp}"
            ))),
            None => Ok(()),
        }
    }
}

/// A point-in-time snapshot of every scope of a storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Scopes by resource name, then parent id
    pub scopes: BTreeMap<ResourceName, BTreeMap<ParentId, ScopeSnapshot>>,
}

impl MemorySnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            scopes: BTreeMap::new(),
        }
    }

    /// Get a scope from the snapshot.
    pub fn scope(&self, resource_name: &str, parent_id: &str) -> Option<&ScopeSnapshot> {
        self.scopes.get(resource_name)?.get(parent_id)
    }

    /// Get or insert a scope.
    pub fn scope_mut(&mut self, resource_name: &str, parent_id: &str) -> &mut ScopeSnapshot {
        self.scopes
            .entry(resource_name.to_owned())
            .or_default()
            .entry(parent_id.to_owned())
            .or_default()
    }

    fn all_scopes(&self) -> impl Iterator<Item = &ScopeSnapshot> {
        self.scopes.values().flat_map(|parents| parents.values())
    }

    /// Count live records across all scopes.
    pub fn record_count(&self) -> usize {
        self.all_scopes().map(|s| s.records.len()).sum()
    }

    /// Count tombstones across all scopes.
    pub fn tombstone_count(&self) -> usize {
        self.all_scopes().map(|s| s.tombstones.len()).sum()
    }

    /// Check internal consistency. Records are read with the `fields`
    /// conventions: each must carry its own id and a modification timestamp
    /// not ahead of its scope.
    pub fn validate(&self, fields: &FieldNames) -> Result<()> {
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (resource_name, parents) in &self.scopes {
            for (parent_id, scope) in parents {
                scope.validate(resource_name, parent_id, fields)?;
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

impl Default for MemorySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// Snapshot format version
    pub format_version: u32,
    /// Number of scopes
    pub scope_count: usize,
    /// Live record count
    pub record_count: usize,
    /// Tombstone count
    pub tombstone_count: usize,
}

impl From<&MemorySnapshot> for SnapshotMetadata {
    fn from(snapshot: &MemorySnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            scope_count: snapshot.all_scopes().count(),
            record_count: snapshot.record_count(),
            tombstone_count: snapshot.tombstone_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn populated() -> MemorySnapshot {
        let mut snapshot = MemorySnapshot::new();
        let scope = snapshot.scope_mut("notes", "u1");
        scope.timestamp = Some(20);
        scope.records.insert(
            "a".into(),
            Record::try_from(json!({"id": "a", "last_modified": 10})).unwrap(),
        );
        scope.tombstones.insert("b".into(), 20);
        snapshot
    }

    #[test]
    fn create_empty_snapshot() {
        let snapshot = MemorySnapshot::new();
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.record_count(), 0);
        assert!(snapshot.validate(&FieldNames::default()).is_ok());
    }

    #[test]
    fn counts_and_lookup() {
        let snapshot = populated();
        assert_eq!(snapshot.record_count(), 1);
        assert_eq!(snapshot.tombstone_count(), 1);
        assert!(snapshot.scope("notes", "u1").is_some());
        assert!(snapshot.scope("notes", "u2").is_none());

        let metadata = SnapshotMetadata::from(&snapshot);
        assert_eq!(metadata.scope_count, 1);
        assert_eq!(metadata.record_count, 1);
        assert_eq!(metadata.tombstone_count, 1);
    }

    #[test]
    fn json_roundtrip_is_deterministic() {
        let snapshot = populated();
        let first = snapshot.to_json().unwrap();
        let parsed = MemorySnapshot::from_json(&first).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.to_json().unwrap(), first);
        assert!(first.contains("formatVersion"));
    }

    #[test]
    fn rejects_future_format() {
        let mut snapshot = MemorySnapshot::new();
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        let json = serde_json::to_string(&snapshot).unwrap();

        assert!(matches!(
            MemorySnapshot::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
        assert!(snapshot.validate(&FieldNames::default()).is_err());
    }

    #[test]
    fn rejects_live_and_deleted_record() {
        let mut snapshot = populated();
        snapshot.scope_mut("notes", "u1").tombstones.insert("a".into(), 5);
        assert!(matches!(
            snapshot.validate(&FieldNames::default()),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn rejects_tombstone_ahead_of_timestamp() {
        let mut snapshot = populated();
        snapshot.scope_mut("notes", "u1").tombstones.insert("c".into(), 99);
        assert!(snapshot.validate(&FieldNames::default()).is_err());
    }

    #[test]
    fn rejects_missing_timestamp() {
        let mut snapshot = populated();
        snapshot.scope_mut("notes", "u1").timestamp = None;
        assert!(snapshot.validate(&FieldNames::default()).is_err());
    }

    #[test]
    fn rejects_record_ahead_of_timestamp() {
        let mut snapshot = populated();
        snapshot.scope_mut("notes", "u1").records.insert(
            "c".into(),
            Record::try_from(json!({"id": "c", "last_modified": 100})).unwrap(),
        );
        assert!(matches!(
            snapshot.validate(&FieldNames::default()),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn rejects_record_under_foreign_key() {
        let mut snapshot = populated();
        snapshot.scope_mut("notes", "u1").records.insert(
            "c".into(),
            Record::try_from(json!({"id": "d", "last_modified": 10})).unwrap(),
        );
        assert!(snapshot.validate(&FieldNames::default()).is_err());
    }

    #[test]
    fn validates_with_custom_field_names() {
        let fields = FieldNames::new("_id", "_mtime", "_gone");
        let mut snapshot = MemorySnapshot::new();
        let scope = snapshot.scope_mut("notes", "u1");
        scope.timestamp = Some(20);
        scope.records.insert(
            "a".into(),
            Record::try_from(json!({"_id": "a", "_mtime": 20})).unwrap(),
        );

        assert!(snapshot.validate(&fields).is_ok());
        assert!(snapshot.validate(&FieldNames::default()).is_err());
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            MemorySnapshot::from_json("not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }
}
