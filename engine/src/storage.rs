//! The storage backend contract.
//!
//! This module defines the [`Storage`] trait every backend implements. All
//! operations are scoped: they take a [`Scope`] naming the resource and the
//! parent (tenant, owner, group...) the records belong to, and must never read
//! or write records of another scope.
//!
//! # Timestamps
//!
//! Each scope has its own modification timestamp. Every successful write
//! stamps the written record (or tombstone) with a value strictly greater than
//! any timestamp previously observed in that scope, and
//! [`Storage::collection_timestamp`] reports the latest one.
//!
//! # Soft deletes
//!
//! Deleting replaces the record with a tombstone carrying only the id,
//! modification and deletion fields. Tombstones are invisible to
//! [`Storage::get`] and only returned by [`Storage::get_all`] when the query
//! includes deleted records.
//!
//! # Uniqueness
//!
//! `unique_fields` is a composite constraint: a write is rejected when another
//! live record in the scope has equal values for every listed field. A record
//! lacking one of the listed fields (or holding `null` there) is not checked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::filter::Filter;
use crate::id::IdGenerator;
use crate::query::Query;
use crate::{FieldNames, Record, Timestamp};

/// The isolation coordinates of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope<'a> {
    /// Kind of record stored, e.g. a table name
    pub resource_name: &'a str,
    /// Owner of the records; empty means unscoped
    pub parent_id: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(resource_name: &'a str, parent_id: &'a str) -> Self {
        Self {
            resource_name,
            parent_id,
        }
    }
}

/// Opaque authentication context, forwarded verbatim to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Auth(Value);

impl Auth {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Storage backend for scoped, soft-deletable records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Current timestamp of the scope.
    ///
    /// For a scope that was never written, returns a baseline that stays
    /// stable until the next write.
    async fn collection_timestamp(&self, scope: Scope<'_>, auth: Option<&Auth>)
        -> Result<Timestamp>;

    /// Reads a page of records.
    ///
    /// Returns the records of the page and the number of records matching
    /// the query filters, regardless of pagination rules and limit.
    async fn get_all(
        &self,
        scope: Scope<'_>,
        query: &Query,
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<(Vec<Record>, usize)>;

    /// Reads a live record.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - if the record is missing or deleted
    async fn get(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<Record>;

    /// Stores a new record.
    ///
    /// A record without id gets one from `id_generator`, or from the
    /// backend's default generator when none is given.
    ///
    /// # Errors
    ///
    /// * `Error::UniqueConstraintViolation` - if a live record already has the
    ///   same id, or the same values for `unique_fields`
    async fn create(
        &self,
        scope: Scope<'_>,
        record: Record,
        id_generator: Option<&dyn IdGenerator>,
        unique_fields: &[&str],
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<Record>;

    /// Replaces a live record.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - if no live record has `record_id`
    /// * `Error::UniqueConstraintViolation` - if another live record has the
    ///   same values for `unique_fields`
    async fn update(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        record: Record,
        unique_fields: &[&str],
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<Record>;

    /// Soft-deletes a record and returns its tombstone.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - if no live record has `record_id`
    async fn delete(
        &self,
        scope: Scope<'_>,
        record_id: &str,
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<Record>;

    /// Soft-deletes every live record matching `filters` and returns the
    /// tombstones. No match is not an error.
    async fn delete_all(
        &self,
        scope: Scope<'_>,
        filters: &[Filter],
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<Vec<Record>>;

    /// Physically removes tombstones, only those older than `before` if set.
    /// Returns how many were removed.
    async fn purge_deleted(
        &self,
        scope: Scope<'_>,
        before: Option<Timestamp>,
        fields: &FieldNames,
        auth: Option<&Auth>,
    ) -> Result<usize>;

    /// Removes everything from the backend.
    async fn flush(&self, auth: Option<&Auth>) -> Result<()>;
}
