//! Collection - the scoped façade over a storage backend.
//!
//! A Collection does no I/O itself. Each operation resolves the parent id,
//! injects the field-name conventions, runs the hooks and forwards to its
//! [`Storage`]. Storage errors pass through unchanged.

use crate::config::Settings;
use crate::error::Result;
use crate::filter::Filter;
use crate::hooks::{Action, HookContext, Hooks};
use crate::id::IdGenerator;
use crate::query::Query;
use crate::storage::{Auth, Scope, Storage};
use crate::{Error, FieldNames, Record, Timestamp};
use std::sync::Arc;

/// Records of one resource kind, isolated by `(name, parent_id)`.
///
/// Neither notion has a built-in meaning: `name` usually is the type of the
/// records and `parent_id` the user or group they belong to. Left empty, the
/// records are not isolated.
#[derive(Clone)]
pub struct Collection {
    storage: Arc<dyn Storage>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    name: String,
    parent_id: String,
    auth: Option<Auth>,
    fields: FieldNames,
    hooks: Hooks,
}

impl Collection {
    /// Create an unscoped collection with default field names.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            id_generator: None,
            name: String::new(),
            parent_id: String::new(),
            auth: None,
            fields: FieldNames::default(),
            hooks: Hooks::new(),
        }
    }

    /// Create a collection from loaded settings.
    pub fn from_settings(storage: Arc<dyn Storage>, settings: &Settings) -> Self {
        Self::new(storage)
            .with_name(settings.name.clone())
            .with_parent_id(settings.parent_id.clone())
            .with_fields(settings.field_names())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_fields(mut self, fields: FieldNames) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn fields(&self) -> &FieldNames {
        &self.fields
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// An empty override falls back to the collection default.
    fn resolve<'a>(&'a self, parent_id: Option<&'a str>) -> &'a str {
        match parent_id {
            Some(parent_id) if !parent_id.is_empty() => parent_id,
            _ => &self.parent_id,
        }
    }

    fn scope<'a>(&'a self, parent_id: &'a str) -> Scope<'a> {
        Scope::new(&self.name, parent_id)
    }

    fn context<'a>(&'a self, action: Action, parent_id: &'a str) -> HookContext<'a> {
        HookContext {
            action,
            resource_name: &self.name,
            parent_id,
        }
    }

    fn record_id(&self, record: &Record) -> Result<String> {
        record
            .id(&self.fields)
            .map(str::to_owned)
            .ok_or_else(|| Error::MissingIdField(self.fields.id.clone()))
    }

    /// Fetch the current timestamp of the collection.
    pub async fn timestamp(&self, parent_id: Option<&str>) -> Result<Timestamp> {
        let parent_id = self.resolve(parent_id);
        self.storage
            .collection_timestamp(self.scope(parent_id), self.auth.as_ref())
            .await
    }

    /// Fetch a page of records and the total number of matching records.
    pub async fn get_records(
        &self,
        query: &Query,
        parent_id: Option<&str>,
    ) -> Result<(Vec<Record>, usize)> {
        let parent_id = self.resolve(parent_id);
        tracing::debug!(
            resource = %self.name,
            parent_id,
            filters = query.filters.len(),
            rules = query.pagination_rules.len(),
            limit = ?query.limit,
            include_deleted = query.include_deleted,
            "fetching records"
        );

        let (records, total) = self
            .storage
            .get_all(self.scope(parent_id), query, &self.fields, self.auth.as_ref())
            .await?;
        let records = self
            .hooks
            .run_after_all(&self.context(Action::Read, parent_id), records)?;
        Ok((records, total))
    }

    /// Fetch a live record, `Error::NotFound` if missing or deleted.
    pub async fn get_record(&self, record_id: &str, parent_id: Option<&str>) -> Result<Record> {
        let parent_id = self.resolve(parent_id);
        tracing::debug!(resource = %self.name, parent_id, record_id, "fetching record");

        let record = self
            .storage
            .get(self.scope(parent_id), record_id, &self.fields, self.auth.as_ref())
            .await?;
        self.hooks
            .run_after(&self.context(Action::Read, parent_id), record)
    }

    /// Create a record in the collection.
    ///
    /// `unique_fields` together must not match another live record of the
    /// scope.
    pub async fn create_record(
        &self,
        mut record: Record,
        parent_id: Option<&str>,
        unique_fields: &[&str],
    ) -> Result<Record> {
        let parent_id = self.resolve(parent_id);
        let ctx = self.context(Action::Create, parent_id);
        self.hooks.run_before(&ctx, &mut record)?;
        tracing::debug!(resource = %self.name, parent_id, "creating record");

        let created = self
            .storage
            .create(
                self.scope(parent_id),
                record,
                self.id_generator.as_deref(),
                unique_fields,
                &self.fields,
                self.auth.as_ref(),
            )
            .await?;
        self.hooks.run_after(&ctx, created)
    }

    /// Replace a record of the collection. The record must carry its id.
    pub async fn update_record(
        &self,
        mut record: Record,
        parent_id: Option<&str>,
        unique_fields: &[&str],
    ) -> Result<Record> {
        let parent_id = self.resolve(parent_id);
        let ctx = self.context(Action::Update, parent_id);
        self.hooks.run_before(&ctx, &mut record)?;
        let record_id = self.record_id(&record)?;
        tracing::debug!(resource = %self.name, parent_id, record_id = %record_id, "updating record");

        let updated = self
            .storage
            .update(
                self.scope(parent_id),
                &record_id,
                record,
                unique_fields,
                &self.fields,
                self.auth.as_ref(),
            )
            .await?;
        self.hooks.run_after(&ctx, updated)
    }

    /// Soft-delete a record and return its tombstone. The record must carry
    /// its id.
    pub async fn delete_record(&self, mut record: Record, parent_id: Option<&str>) -> Result<Record> {
        let parent_id = self.resolve(parent_id);
        let ctx = self.context(Action::Delete, parent_id);
        self.hooks.run_before(&ctx, &mut record)?;
        let record_id = self.record_id(&record)?;
        tracing::debug!(resource = %self.name, parent_id, record_id = %record_id, "deleting record");

        let tombstone = self
            .storage
            .delete(self.scope(parent_id), &record_id, &self.fields, self.auth.as_ref())
            .await?;
        self.hooks.run_after(&ctx, tombstone)
    }

    /// Soft-delete every live record matching `filters` (AND) and return
    /// their tombstones.
    pub async fn delete_records(
        &self,
        filters: &[Filter],
        parent_id: Option<&str>,
    ) -> Result<Vec<Record>> {
        let parent_id = self.resolve(parent_id);
        tracing::debug!(resource = %self.name, parent_id, filters = filters.len(), "deleting records");

        let tombstones = self
            .storage
            .delete_all(self.scope(parent_id), filters, &self.fields, self.auth.as_ref())
            .await?;
        self.hooks
            .run_after_all(&self.context(Action::Delete, parent_id), tombstones)
    }

    /// Physically remove tombstones older than `before` (all if `None`).
    pub async fn purge_deleted(
        &self,
        before: Option<Timestamp>,
        parent_id: Option<&str>,
    ) -> Result<usize> {
        let parent_id = self.resolve(parent_id);
        let purged = self
            .storage
            .purge_deleted(self.scope(parent_id), before, &self.fields, self.auth.as_ref())
            .await?;
        tracing::debug!(resource = %self.name, parent_id, purged, "purged tombstones");
        Ok(purged)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("backend", &self.storage.backend_name())
            .field("name", &self.name)
            .field("parent_id", &self.parent_id)
            .field("fields", &self.fields)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use serde_json::json;

    fn notes() -> Collection {
        Collection::new(Arc::new(MemoryStorage::new()))
            .with_name("notes")
            .with_parent_id("u1")
    }

    #[test]
    fn parent_id_resolution() {
        let collection = notes();
        assert_eq!(collection.resolve(None), "u1");
        assert_eq!(collection.resolve(Some("u2")), "u2");
        assert_eq!(collection.resolve(Some("")), "u1");
        assert_eq!(collection.parent_id(), "u1");
    }

    #[test]
    fn from_settings() {
        let settings = Settings {
            name: "tasks".into(),
            parent_id: "team".into(),
            id_field: "_id".into(),
            ..Settings::default()
        };
        let collection = Collection::from_settings(Arc::new(MemoryStorage::new()), &settings);

        assert_eq!(collection.name(), "tasks");
        assert_eq!(collection.parent_id(), "team");
        assert_eq!(collection.fields().id, "_id");
        assert_eq!(collection.storage().backend_name(), "memory");
    }

    #[tokio::test]
    async fn update_requires_id() {
        let err = notes()
            .update_record(Record::try_from(json!({"title": "x"})).unwrap(), None, &[])
            .await
            .unwrap_err();
        assert_eq!(err, Error::MissingIdField("id".into()));
    }

    #[tokio::test]
    async fn delete_requires_id() {
        let err = notes().delete_record(Record::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::MissingIdField(_)));
    }

    #[test]
    fn debug_shows_backend() {
        let debug = format!("{:?}", notes());
        assert!(debug.contains("memory"));
        assert!(debug.contains("notes"));
    }
}
