//! Record types for storing data.
//!
//! A [`Record`] is an open map of field names to JSON values. Three fields are
//! reserved by convention (identifier, modification timestamp, deletion marker)
//! and their names are carried by [`FieldNames`], so the typed accessors always
//! take the conventions in use.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default name of the identifier field.
pub const DEFAULT_ID_FIELD: &str = "id";
/// Default name of the modification timestamp field.
pub const DEFAULT_MODIFIED_FIELD: &str = "last_modified";
/// Default name of the deletion marker field.
pub const DEFAULT_DELETED_FIELD: &str = "deleted";

/// Names of the reserved fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNames {
    /// Identifier field
    pub id: String,
    /// Modification timestamp field
    pub modified: String,
    /// Deletion marker field, only present on tombstones
    pub deleted: String,
}

impl FieldNames {
    pub fn new(
        id: impl Into<String>,
        modified: impl Into<String>,
        deleted: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            modified: modified.into(),
            deleted: deleted.into(),
        }
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FIELD, DEFAULT_MODIFIED_FIELD, DEFAULT_DELETED_FIELD)
    }
}

/// A schema-less record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Build the tombstone left behind by a soft delete.
    pub fn tombstone(id: impl Into<Value>, last_modified: Timestamp, names: &FieldNames) -> Self {
        Self::new()
            .with(names.id.clone(), id)
            .with(names.modified.clone(), last_modified)
            .with(names.deleted.clone(), true)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// The record identifier, if present and a string.
    pub fn id(&self, names: &FieldNames) -> Option<&str> {
        self.get(&names.id).and_then(Value::as_str)
    }

    /// The modification timestamp, if present and a non-negative integer.
    pub fn last_modified(&self, names: &FieldNames) -> Option<Timestamp> {
        self.get(&names.modified).and_then(Value::as_u64)
    }

    /// Whether this record is a tombstone.
    pub fn is_deleted(&self, names: &FieldNames) -> bool {
        self.get(&names.deleted)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_id(&mut self, names: &FieldNames, id: impl Into<String>) {
        self.insert(names.id.clone(), id.into());
    }

    pub fn set_last_modified(&mut self, names: &FieldNames, timestamp: Timestamp) {
        self.insert(names.modified.clone(), timestamp);
    }

    /// The identifier as written by the caller.
    ///
    /// Unlike [`Record::id`] this distinguishes a missing id (`Ok(None)`) from
    /// an id that is not a string.
    pub fn checked_id(&self, names: &FieldNames) -> Result<Option<&str>> {
        match self.get(&names.id) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id)),
            Some(other) => Err(Error::InvalidRecord(format!(
                "'{}' must be a string, got {}",
                names.id, other
            ))),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::InvalidRecord(format!(
                "record must be an object, got {other}"
            ))),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_record() {
        let names = FieldNames::default();
        let record = Record::try_from(json!({"id": "note-1", "title": "Hello"})).unwrap();

        assert_eq!(record.id(&names), Some("note-1"));
        assert_eq!(record.get("title"), Some(&json!("Hello")));
        assert_eq!(record.last_modified(&names), None);
        assert!(!record.is_deleted(&names));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn non_object_is_rejected() {
        let result = Record::try_from(json!([1, 2, 3]));
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn custom_field_names() {
        let names = FieldNames::new("_id", "_mtime", "_gone");
        let mut record = Record::new().with("_id", "a");
        record.set_last_modified(&names, 42);

        assert_eq!(record.id(&names), Some("a"));
        assert_eq!(record.last_modified(&names), Some(42));
        assert_eq!(record.id(&FieldNames::default()), None);
    }

    #[test]
    fn tombstone_shape() {
        let names = FieldNames::default();
        let tombstone = Record::tombstone("note-1", 1234, &names);

        assert_eq!(
            tombstone.into_value(),
            json!({"id": "note-1", "last_modified": 1234, "deleted": true})
        );
    }

    #[test]
    fn checked_id() {
        let names = FieldNames::default();

        let missing = Record::new();
        assert_eq!(missing.checked_id(&names).unwrap(), None);

        let null = Record::new().with("id", Value::Null);
        assert_eq!(null.checked_id(&names).unwrap(), None);

        let numeric = Record::new().with("id", 12);
        assert!(matches!(
            numeric.checked_id(&names),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn serialization_is_transparent() {
        let record = Record::new().with("id", "x").with("n", 3);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"x","n":3}"#);

        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
