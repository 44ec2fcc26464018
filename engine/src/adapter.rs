//! The storage adapter contract.
//!
//! The engine owns no state. Everything it reads or writes goes through a
//! [`StorageAdapter`], which persists records and attachments, keeps the
//! change log, and answers "what changed since T, excluding this device".

use crate::{
    error::Result, AttachmentId, AttachmentMeta, ChangeEntry, Record, Timestamp,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How an adapter treats a write to a record that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictDetection {
    /// Plain upsert; the engine's timestamp comparison is the only check (default)
    #[default]
    Timestamp,
    /// Track per-record version vectors and resolve concurrent writes
    VersionVector,
}

impl std::str::FromStr for ConflictDetection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(ConflictDetection::Timestamp),
            "version-vector" => Ok(ConflictDetection::VersionVector),
            other => Err(format!("unknown conflict detection mode: {}", other)),
        }
    }
}

/// One page of a paginated "changes since" query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Records in this page, ordered by id
    pub records: Vec<Record>,
    /// Size of the full, unsliced result
    pub total: usize,
    /// Whether records remain after this page
    pub has_more: bool,
}

impl Page {
    /// Slice an id-ordered record list.
    pub fn slice(records: Vec<Record>, limit: usize, offset: usize) -> Self {
        let total = records.len();
        let records: Vec<Record> = records.into_iter().skip(offset).take(limit).collect();
        let has_more = offset.saturating_add(records.len()) < total;
        Self {
            records,
            total,
            has_more,
        }
    }
}

/// Persistence contract consumed by the [`SyncEngine`](crate::SyncEngine).
///
/// Implementations must be safe to call concurrently from syncs of different
/// devices. Any failure is reported as an [`Error`](crate::Error) and aborts
/// the surrounding sync.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Live records changed after `since` whose latest change in that window
    /// was not authored by `device_id`. Logically deleted records are
    /// excluded. Results are ordered by id.
    async fn changes_since(&self, since: Timestamp, device_id: &str) -> Result<Vec<Record>>;

    /// [`changes_since`](Self::changes_since), sliced after materialization
    /// so page boundaries follow record identity.
    async fn changes_since_paginated(
        &self,
        since: Timestamp,
        device_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page>;

    /// Idempotent upsert by id. Every write is logged against `device_id`.
    async fn apply_records(&self, records: Vec<Record>, device_id: &str) -> Result<()>;

    /// Logically delete a record. Fails with `RecordNotFound` when no live
    /// record has this id.
    async fn delete_record(&self, record_id: &str, device_id: &str) -> Result<()>;

    /// Retained change-log entries for one record, oldest first.
    async fn change_history(&self, record_id: &str) -> Result<Vec<ChangeEntry>>;

    /// Store attachment bytes and return the attachment id.
    async fn store_attachment(&self, bytes: Vec<u8>, meta: AttachmentMeta)
        -> Result<AttachmentId>;

    /// Fetch attachment bytes, failing with `AttachmentNotFound` when absent.
    async fn fetch_attachment(&self, attachment_id: &str) -> Result<(AttachmentMeta, Vec<u8>)>;

    /// Every live record, for export and diagnostics.
    async fn get_all_records(&self) -> Result<Vec<Record>>;
}

#[async_trait]
impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    async fn changes_since(&self, since: Timestamp, device_id: &str) -> Result<Vec<Record>> {
        (**self).changes_since(since, device_id).await
    }

    async fn changes_since_paginated(
        &self,
        since: Timestamp,
        device_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        (**self)
            .changes_since_paginated(since, device_id, limit, offset)
            .await
    }

    async fn apply_records(&self, records: Vec<Record>, device_id: &str) -> Result<()> {
        (**self).apply_records(records, device_id).await
    }

    async fn delete_record(&self, record_id: &str, device_id: &str) -> Result<()> {
        (**self).delete_record(record_id, device_id).await
    }

    async fn change_history(&self, record_id: &str) -> Result<Vec<ChangeEntry>> {
        (**self).change_history(record_id).await
    }

    async fn store_attachment(
        &self,
        bytes: Vec<u8>,
        meta: AttachmentMeta,
    ) -> Result<AttachmentId> {
        (**self).store_attachment(bytes, meta).await
    }

    async fn fetch_attachment(&self, attachment_id: &str) -> Result<(AttachmentMeta, Vec<u8>)> {
        (**self).fetch_attachment(attachment_id).await
    }

    async fn get_all_records(&self) -> Result<Vec<Record>> {
        (**self).get_all_records().await
    }
}
