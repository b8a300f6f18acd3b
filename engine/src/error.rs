//! Error types for the Quiver engine.

use crate::{ParentId, Record, RecordId, ResourceName};
use thiserror::Error;

/// All possible errors from collections and storage backends.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Storage contract errors
    #[error("record not found: {resource_name}/{record_id}")]
    NotFound {
        resource_name: ResourceName,
        record_id: RecordId,
    },

    #[error("unique constraint violated on ({})", .fields.join(", "))]
    UniqueConstraintViolation {
        fields: Vec<String>,
        existing: Box<Record>,
    },

    // Caller errors
    #[error("record has no '{0}' field")]
    MissingIdField(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("hook failed: {0}")]
    Hook(String),

    // State errors
    #[error("timestamp space exhausted in scope {resource_name}/{parent_id:?}")]
    TimestampOverflow {
        resource_name: ResourceName,
        parent_id: ParentId,
    },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Build a [`Error::NotFound`] for a record in a resource.
    pub fn not_found(resource_name: impl Into<ResourceName>, record_id: impl Into<RecordId>) -> Self {
        Error::NotFound {
            resource_name: resource_name.into(),
            record_id: record_id.into(),
        }
    }

    /// Build a [`Error::UniqueConstraintViolation`] pointing at the record
    /// that already holds the values.
    pub fn unique_violation<I, S>(fields: I, existing: Record) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Error::UniqueConstraintViolation {
            fields: fields.into_iter().map(Into::into).collect(),
            existing: Box::new(existing),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::UniqueConstraintViolation { .. })
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
