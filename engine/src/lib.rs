//! # Quiver Engine
//!
//! Scoped record collections over pluggable storage backends.
//!
//! This crate provides the record-collection layer of a sync-friendly API
//! server. Records are schemaless JSON objects grouped by resource name and
//! isolated per parent (user, group...). Every write is stamped with a
//! per-scope monotonic timestamp and deletes leave tombstones, so clients can
//! ask for "everything changed since T" and see deletions too.
//!
//! ## Design Principles
//!
//! - **Storage agnostic**: a [`Collection`] never does I/O itself, it
//!   forwards to a [`Storage`] backend
//! - **Scoped**: every call is confined to one `(name, parent_id)` pair
//! - **Soft deletes**: deleted records survive as tombstones until purged
//! - **Monotonic**: timestamps strictly increase within a scope
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a JSON object. Three fields are reserved and renamable
//! through [`FieldNames`]: the id, the modification timestamp and the
//! deletion marker.
//!
//! ### Queries
//!
//! A [`Query`] combines AND-ed [`Filter`]s, an ordered list of [`Sort`]s,
//! OR-ed pagination rules and a limit. [`pagination_rules_after`] builds the
//! rules resuming a listing after the last record of a page.
//!
//! ### Hooks
//!
//! [`Hooks`] run before and after operations to validate or transform
//! records, without subclassing anything.
//!
//! ## Quick Start
//!
//! ```rust
//! use quiver_engine::{Collection, Filter, MemoryStorage, Query, Record, Sort};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> quiver_engine::Result<()> {
//! // 1. Pick a backend and scope a collection
//! let notes = Collection::new(Arc::new(MemoryStorage::new()))
//!     .with_name("notes")
//!     .with_parent_id("alice");
//!
//! // 2. Write records
//! let note = Record::new().with("title", "groceries").with("done", false);
//! let created = notes.create_record(note, None, &["title"]).await?;
//! assert!(created.contains("id"));
//!
//! // 3. Query them
//! let query = Query::new()
//!     .filter(Filter::eq("done", false))
//!     .sort(Sort::desc("last_modified"))
//!     .limit(10);
//! let (records, total) = notes.get_records(&query, None).await?;
//! assert_eq!(records.len(), 1);
//! assert_eq!(total, 1);
//!
//! // 4. Delete, leaving a tombstone
//! let tombstone = notes.delete_record(created, None).await?;
//! assert_eq!(tombstone.get("deleted"), Some(&json!(true)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! Use [`MemoryStorage::export_state`] and [`MemoryStorage::import_state`]
//! with [`MemorySnapshot`] to persist the in-memory backend. Snapshots are
//! serializable to JSON with deterministic ordering.

pub mod clock;
pub mod collection;
pub mod config;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod id;
pub mod memory;
pub mod query;
pub mod record;
pub mod snapshot;
pub mod storage;

// Re-export main types at crate root
pub use clock::ScopeClock;
pub use collection::Collection;
pub use config::{ConfigError, Settings};
pub use error::{Error, Result};
pub use filter::{Comparator, Direction, Filter, Sort};
pub use hooks::{Action, HookContext, Hooks};
pub use id::{IdGenerator, UuidGenerator};
pub use memory::MemoryStorage;
pub use query::{extract_record_set, pagination_rules_after, PaginationRule, Query};
pub use record::{FieldNames, Record};
pub use snapshot::{MemorySnapshot, ScopeSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use storage::{Auth, Scope, Storage};

/// Type aliases for clarity
pub type RecordId = String;
pub type ResourceName = String;
pub type ParentId = String;
pub type Timestamp = u64;
