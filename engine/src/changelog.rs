//! Append-only change log.
//!
//! The log records who changed what when. It answers incremental "changed
//! since" queries and keeps a per-record trail for debugging and for
//! resolvers that need history.
//!
//! # Pruning
//!
//! After every append the log keeps the union of:
//! 1. the most recent entry of every record id, and
//! 2. the most recent `buffer` entries overall,
//!
//! and drops everything else. The latest state of every record survives
//! regardless of age; only superseded history outside the buffer is lost.

use crate::{DeviceId, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default number of most recent entries retained by pruning.
pub const DEFAULT_PRUNE_BUFFER: usize = 100;

/// The kind of write a change-log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl std::str::FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeOperation::Create),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            other => Err(format!("unknown change operation: {}", other)),
        }
    }
}

/// One write, attributed to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Position in application order, unique within one log
    pub seq: u64,
    pub record_id: RecordId,
    pub device_id: DeviceId,
    pub timestamp: Timestamp,
    pub operation: ChangeOperation,
}

/// Append-only, pruned log of change entries.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    /// Entries in application order (ascending `seq`)
    entries: Vec<ChangeEntry>,
    /// Latest `seq` per record id
    latest: HashMap<RecordId, u64>,
    /// Sequences of entries that are no longer the latest for their record
    superseded: BTreeSet<u64>,
    next_seq: u64,
    buffer: usize,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeLog {
    /// Create an empty log with the default prune buffer.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_PRUNE_BUFFER)
    }

    /// Create an empty log retaining `buffer` recent entries when pruning.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            entries: Vec::new(),
            latest: HashMap::new(),
            superseded: BTreeSet::new(),
            next_seq: 1,
            buffer,
        }
    }

    /// Append one entry, then prune. Returns the entry's sequence number.
    pub fn append(
        &mut self,
        record_id: impl Into<RecordId>,
        device_id: impl Into<DeviceId>,
        timestamp: Timestamp,
        operation: ChangeOperation,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let record_id = record_id.into();
        if let Some(previous) = self.latest.insert(record_id.clone(), seq) {
            self.superseded.insert(previous);
        }
        self.entries.push(ChangeEntry {
            seq,
            record_id,
            device_id: device_id.into(),
            timestamp,
            operation,
        });

        self.prune();
        seq
    }

    /// Drop superseded entries that fell out of the recent-entries buffer.
    fn prune(&mut self) {
        // Entries with seq below this bound are outside the buffer.
        let window_start = self.next_seq.saturating_sub(self.buffer as u64);
        let droppable = match self.superseded.first() {
            Some(&oldest) => oldest < window_start,
            None => false,
        };
        if !droppable {
            return;
        }

        let keep = self.superseded.split_off(&window_start);
        let dropped = std::mem::replace(&mut self.superseded, keep);
        self.entries.retain(|e| !dropped.contains(&e.seq));

        tracing::trace!(
            dropped = dropped.len(),
            retained = self.entries.len(),
            "Pruned change log"
        );
    }

    /// Distinct record ids whose most recent entry newer than `since` was not
    /// authored by `excluding_device`, sorted by id.
    pub fn changed_ids_since(&self, since: Timestamp, excluding_device: &str) -> Vec<RecordId> {
        let mut last_author: HashMap<&str, &str> = HashMap::new();
        for entry in self.entries.iter().filter(|e| e.timestamp > since) {
            last_author.insert(entry.record_id.as_str(), entry.device_id.as_str());
        }

        let mut ids: Vec<RecordId> = last_author
            .into_iter()
            .filter(|(_, device_id)| *device_id != excluding_device)
            .map(|(record_id, _)| record_id.to_string())
            .collect();
        ids.sort();
        ids
    }

    /// All retained entries for one record, oldest first.
    pub fn history(&self, record_id: &str) -> Vec<ChangeEntry> {
        self.entries
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect()
    }

    /// The most recent entry for a record, if any survives.
    pub fn latest(&self, record_id: &str) -> Option<&ChangeEntry> {
        let seq = *self.latest.get(record_id)?;
        self.entries
            .binary_search_by_key(&seq, |e| e.seq)
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// All retained entries in application order.
    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of most recent entries retained by pruning.
    pub fn buffer(&self) -> usize {
        self.buffer
    }
}
