//! In-memory storage adapter.
//!
//! Owns its live records, tombstone set, attachment store and change log.
//! Each instance is independent, so tests and embedded deployments construct
//! one per run.

use crate::{
    adapter::{ConflictDetection, Page, StorageAdapter},
    error::Result,
    resolve::ConflictResolver,
    version, AttachmentId, AttachmentMeta, ChangeEntry, ChangeLog, ChangeOperation, Error,
    LastWriteWins, Record, RecordId, Timestamp, DEFAULT_PRUNE_BUFFER,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Records, tombstones and log, mutated together under one lock so a write
/// and its log entry are atomic.
#[derive(Debug)]
struct MemoryState {
    records: HashMap<RecordId, Record>,
    tombstones: HashSet<RecordId>,
    log: ChangeLog,
}

impl MemoryState {
    fn live(&self, id: &str) -> Option<&Record> {
        if self.tombstones.contains(id) {
            return None;
        }
        self.records.get(id)
    }

    fn live_sorted(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .values()
            .filter(|r| !self.tombstones.contains(&r.id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    fn changes_since(&self, since: Timestamp, device_id: &str) -> Vec<Record> {
        self.log
            .changed_ids_since(since, device_id)
            .iter()
            .filter_map(|id| self.live(id).cloned())
            .collect()
    }
}

/// Storage adapter keeping all state in process memory.
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
    attachments: DashMap<AttachmentId, (AttachmentMeta, Vec<u8>)>,
    detection: ConflictDetection,
    resolver: Arc<dyn ConflictResolver>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Timestamp-mode adapter with the default prune buffer.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemoryAdapterBuilder {
        MemoryAdapterBuilder::default()
    }

    /// The configured conflict detection mode.
    pub fn conflict_detection(&self) -> ConflictDetection {
        self.detection
    }

    /// Number of entries currently retained in the change log.
    pub fn change_log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Whether a record id is in the tombstone set.
    pub fn is_deleted(&self, record_id: &str) -> bool {
        self.state.lock().tombstones.contains(record_id)
    }

    /// Number of stored attachments.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn changes_since(&self, since: Timestamp, device_id: &str) -> Result<Vec<Record>> {
        Ok(self.state.lock().changes_since(since, device_id))
    }

    async fn changes_since_paginated(
        &self,
        since: Timestamp,
        device_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        let records = self.state.lock().changes_since(since, device_id);
        Ok(Page::slice(records, limit, offset))
    }

    async fn apply_records(&self, records: Vec<Record>, device_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        // Stamped under the lock, after any read that could have missed this batch.
        let now = crate::now();
        let mut written = 0usize;

        for incoming in records {
            let live = state.live(&incoming.id).cloned();
            // Version-vector mode counts every write, so only plain upserts dedupe.
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

            let id = next.id.clone();
            state.tombstones.remove(&id);
            state.records.insert(id.clone(), next);
            state.log.append(id, device_id, now, operation);
            written += 1;
        }

        tracing::debug!(device_id, written, log_len = state.log.len(), "Applied records");
        Ok(())
    }

    async fn delete_record(&self, record_id: &str, device_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.live(record_id).is_none() {
            return Err(Error::RecordNotFound(record_id.to_string()));
        }

        state.tombstones.insert(record_id.to_string());
        state
            .log
            .append(record_id, device_id, crate::now(), ChangeOperation::Delete);

        tracing::debug!(record_id, device_id, "Deleted record");
        Ok(())
    }

    async fn change_history(&self, record_id: &str) -> Result<Vec<ChangeEntry>> {
        Ok(self.state.lock().log.history(record_id))
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

        let id = meta.id.clone();
        self.attachments.insert(id.clone(), (meta, bytes));
        Ok(id)
    }

    async fn fetch_attachment(&self, attachment_id: &str) -> Result<(AttachmentMeta, Vec<u8>)> {
        self.attachments
            .get(attachment_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::AttachmentNotFound(attachment_id.to_string()))
    }

    async fn get_all_records(&self) -> Result<Vec<Record>> {
        Ok(self.state.lock().live_sorted())
    }
}

/// Builder for [`MemoryAdapter`].
pub struct MemoryAdapterBuilder {
    detection: ConflictDetection,
    resolver: Arc<dyn ConflictResolver>,
    buffer: usize,
}

impl Default for MemoryAdapterBuilder {
    fn default() -> Self {
        Self {
            detection: ConflictDetection::default(),
            resolver: Arc::new(LastWriteWins),
            buffer: DEFAULT_PRUNE_BUFFER,
        }
    }
}

impl MemoryAdapterBuilder {
    pub fn conflict_detection(mut self, detection: ConflictDetection) -> Self {
        self.detection = detection;
        self
    }

    /// Resolver for concurrent writes in version-vector mode.
    pub fn resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn shared_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Number of most recent change-log entries kept by pruning.
    pub fn change_log_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn build(self) -> MemoryAdapter {
        MemoryAdapter {
            state: Mutex::new(MemoryState {
                records: HashMap::new(),
                tombstones: HashSet::new(),
                log: ChangeLog::with_buffer(self.buffer),
            }),
            attachments: DashMap::new(),
            detection: self.detection,
            resolver: self.resolver,
        }
    }
}
