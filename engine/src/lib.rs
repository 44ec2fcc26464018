//! # Tandem Engine
//!
//! The synchronization and conflict-resolution core for Tandem.
//!
//! Devices periodically exchange their local changes for the changes made
//! elsewhere through a central coordinator. This crate holds everything that
//! carries an invariant in that exchange: the change log that answers
//! "what changed since my last sync", the version vectors that tell true
//! concurrency apart from plain timestamp ordering, the pluggable conflict
//! resolvers, and the [`SyncEngine`] that drives one exchange.
//!
//! ## Design Principles
//!
//! - **Stateless engine**: all mutable state lives behind a [`StorageAdapter`]
//! - **One read, one write**: a sync performs exactly one adapter read and one
//!   batched adapter write, holding no lock between them
//! - **Errors as data**: a resolver that cannot decide produces a
//!   [`ConflictReport`], never a failed sync
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is the unit of synchronization: an id, an application-defined
//! type, an opaque JSON payload, an `updatedAt` timestamp and an open `meta`
//! map. Version vectors travel under `meta.versionVector`.
//!
//! ### Change Log
//!
//! The [`ChangeLog`] is an append-only list of [`ChangeEntry`] values. It is
//! pruned after every append down to the latest entry per record plus a
//! buffer of the most recent entries overall.
//!
//! ### Conflict Resolution
//!
//! A [`ConflictResolver`] turns two versions of a record into one:
//! - [`LastWriteWins`] - greater `updatedAt` wins, ties keep the existing one (default)
//! - [`FieldMerge`] - shallow merge of top-level payload fields
//! - any `Fn(&Record, &Record) -> Result<Record, ResolveError>` closure
//!
//! ## Quick Start
//!
//! ```rust
//! use tandem_engine::{MemoryAdapter, Record, SyncEngine, SyncPayload};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = SyncEngine::new(MemoryAdapter::new());
//!
//! let record = Record::new("note-1", "note", json!({"title": "Groceries"}));
//! let payload = SyncPayload::new("device-a", tandem_engine::epoch()).with_records(vec![record]);
//!
//! let result = engine.apply_changes(payload).await.unwrap();
//! assert!(result.conflicts.is_none());
//!
//! let stored = engine.export().await.unwrap();
//! assert_eq!(stored.len(), 1);
//! # }
//! ```

pub mod adapter;
pub mod changelog;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod record;
pub mod resolve;
pub mod sync;
pub mod version;

// Re-export main types at crate root
pub use adapter::{ConflictDetection, Page, StorageAdapter};
pub use changelog::{ChangeEntry, ChangeLog, ChangeOperation, DEFAULT_PRUNE_BUFFER};
pub use error::Error;
pub use memory::{MemoryAdapter, MemoryAdapterBuilder};
pub use protocol::{ConflictReport, SyncPayload, SyncResult};
pub use record::{AttachmentMeta, Record, VERSION_VECTOR_KEY};
pub use resolve::{ConflictResolver, FieldMerge, LastWriteWins, ResolveError};
pub use sync::{AllowAll, ApiKeys, CredentialValidator, SyncEngine};
pub use version::{Causality, VersionVector};

/// Type aliases for clarity
pub type RecordId = String;
pub type DeviceId = String;
pub type AttachmentId = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The Unix epoch, the checkpoint of a device that has never synchronized.
pub fn epoch() -> Timestamp {
    chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
}

/// Current wall-clock time, used for change-log entries and sync timestamps.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// `ts` cut to the microsecond precision relational stores keep.
pub fn truncate_micros(ts: Timestamp) -> Timestamp {
    use chrono::SubsecRound;
    ts.trunc_subsecs(6)
}

/// Change-log stamp for an entry written at `at`.
///
/// Strictly after every checkpoint taken at or before `at`, once both are
/// truncated. Entries may be delivered twice but never skipped.
pub fn stamp_after(at: Timestamp) -> Timestamp {
    truncate_micros(at) + chrono::Duration::microseconds(1)
}
