//! PostgreSQL implementation of the engine's storage contract.

use std::sync::Arc;

use async_trait::async_trait;
use tandem_engine::error::Result;
use tandem_engine::{
    version, AttachmentId, AttachmentMeta, ChangeEntry, ChangeOperation, ConflictDetection,
    ConflictResolver, Error, LastWriteWins, Page, Record, StorageAdapter, Timestamp,
    DEFAULT_PRUNE_BUFFER,
};

use super::{
    append_change, get_attachment, get_changed_records, get_changed_records_page, get_history,
    get_live_records, insert_attachment, lock_change_log, lock_record, lock_record_ids,
    mark_deleted, prune_change_log, share_change_log, upsert_record, Pool, StoredRecord,
};

/// Storage adapter backed by a PostgreSQL pool.
///
/// Each batch of writes runs in one transaction holding an advisory lock
/// per record id, including ids with no row yet, so concurrent syncs
/// observe either all or none of a batch. Change-log appends take an
/// exclusive log lock that readers share, which orders every entry's
/// timestamp after the checkpoints of reads that missed it.
pub struct PgAdapter {
    pool: Pool,
    detection: ConflictDetection,
    resolver: Arc<dyn ConflictResolver>,
    buffer: i64,
}

impl PgAdapter {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            detection: ConflictDetection::default(),
            resolver: Arc::new(LastWriteWins),
            buffer: DEFAULT_PRUNE_BUFFER as i64,
        }
    }

    pub fn with_conflict_detection(mut self, detection: ConflictDetection) -> Self {
        self.detection = detection;
        self
    }

    /// Resolver used for concurrent writes in version-vector mode.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_change_log_buffer(mut self, buffer: usize) -> Self {
        self.buffer = i64::try_from(buffer).unwrap_or(i64::MAX);
        self
    }
}

fn storage(err: sqlx::Error) -> Error {
    tracing::error!("Database error: {:?}", err);
    Error::storage(err)
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl StorageAdapter for PgAdapter {
    async fn changes_since(&self, since: Timestamp, device_id: &str) -> Result<Vec<Record>> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        share_change_log(&mut tx).await.map_err(storage)?;
        let rows = get_changed_records(&mut tx, since, device_id)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(rows.into_iter().map(StoredRecord::into_record).collect())
    }

    async fn changes_since_paginated(
        &self,
        since: Timestamp,
        device_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        share_change_log(&mut tx).await.map_err(storage)?;
        let (rows, total) =
            get_changed_records_page(&mut tx, since, device_id, to_i64(limit), to_i64(offset))
                .await
                .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        let total = total.max(0) as usize;
        let records: Vec<Record> = rows.into_iter().map(StoredRecord::into_record).collect();
        let has_more = offset.saturating_add(records.len()) < total;

        Ok(Page {
            records,
            total,
            has_more,
        })
    }

    async fn apply_records(&self, records: Vec<Record>, device_id: &str) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        lock_record_ids(&mut tx, &ids).await.map_err(storage)?;

        let mut pending = Vec::with_capacity(records.len());
        for incoming in records {
            let live = lock_record(&mut tx, &incoming.id)
                .await
                .map_err(storage)?
                .filter(|row| !row.deleted)
                .map(StoredRecord::into_record);

            if self.detection == ConflictDetection::Timestamp {
                if let Some(stored) = &live {
                    if stored.same_content(&incoming) {
                        tracing::trace!(record_id = %incoming.id, "Skipping duplicate write");
                        continue;
                    }
                }
            }

            let operation = if live.is_some() {
                ChangeOperation::Update
            } else {
                ChangeOperation::Create
            };
            let next = match self.detection {
                ConflictDetection::Timestamp => incoming,
                ConflictDetection::VersionVector => {
                    version::merge_write(live.as_ref(), incoming, device_id, self.resolver.as_ref())
                }
            };

            upsert_record(&mut tx, &next).await.map_err(storage)?;
            pending.push((next.id, operation));
        }

        let written = pending.len();
        let mut pruned = 0;
        if written > 0 {
            lock_change_log(&mut tx).await.map_err(storage)?;
            // Stamped under the log lock, after any read that could have missed this batch.
            let stamp = tandem_engine::stamp_after(tandem_engine::now());
            for (record_id, operation) in &pending {
                append_change(&mut tx, record_id, device_id, stamp, *operation)
                    .await
                    .map_err(storage)?;
            }
            pruned = prune_change_log(&mut tx, self.buffer)
                .await
                .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;

        tracing::debug!(device_id, written, pruned, "Applied records");
        Ok(())
    }

    async fn delete_record(&self, record_id: &str, device_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        lock_record_ids(&mut tx, &[record_id.to_string()])
            .await
            .map_err(storage)?;

        let live = lock_record(&mut tx, record_id)
            .await
            .map_err(storage)?
            .is_some_and(|row| !row.deleted);
        if !live {
            return Err(Error::RecordNotFound(record_id.to_string()));
        }

        mark_deleted(&mut tx, record_id).await.map_err(storage)?;
        lock_change_log(&mut tx).await.map_err(storage)?;
        let stamp = tandem_engine::stamp_after(tandem_engine::now());
        append_change(&mut tx, record_id, device_id, stamp, ChangeOperation::Delete)
            .await
            .map_err(storage)?;
        prune_change_log(&mut tx, self.buffer)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        tracing::debug!(record_id, device_id, "Deleted record");
        Ok(())
    }

    async fn change_history(&self, record_id: &str) -> Result<Vec<ChangeEntry>> {
        let rows = get_history(&self.pool, record_id).await.map_err(storage)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.to_entry() {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping change log entry {}: {}", row.seq, e),
            }
        }
        Ok(entries)
    }

    async fn store_attachment(
        &self,
        bytes: Vec<u8>,
        mut meta: AttachmentMeta,
    ) -> Result<AttachmentId> {
        if meta.id.is_empty() {
            meta.id = uuid::Uuid::new_v4().to_string();
        }
        meta.size = bytes.len() as u64;

        insert_attachment(&self.pool, &meta, &bytes)
            .await
            .map_err(storage)?;
        Ok(meta.id)
    }

    async fn fetch_attachment(
        &self,
        attachment_id: &str,
    ) -> Result<(AttachmentMeta, Vec<u8>)> {
        get_attachment(&self.pool, attachment_id)
            .await
            .map_err(storage)?
            .map(|row| row.into_parts())
            .ok_or_else(|| Error::AttachmentNotFound(attachment_id.to_string()))
    }

    async fn get_all_records(&self) -> Result<Vec<Record>> {
        let rows = get_live_records(&self.pool).await.map_err(storage)?;
        Ok(rows.into_iter().map(StoredRecord::into_record).collect())
    }
}
