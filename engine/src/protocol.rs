//! Request and response envelopes of one sync exchange.

use crate::{AttachmentMeta, DeviceId, Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// A client's sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Records changed on the device since its last sync
    #[serde(default)]
    pub records: Vec<Record>,
    /// Ids the device deleted locally
    #[serde(default)]
    pub deleted_ids: Vec<RecordId>,
    /// Metadata of attachments uploaded alongside the batch
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    /// Blank ids are rejected by the engine, not the decoder
    #[serde(default)]
    pub device_id: DeviceId,
    /// Checkpoint: the `syncTimestamp` of the device's last successful sync
    pub last_sync_at: Timestamp,
}

impl SyncPayload {
    /// An empty batch from `device_id` with the given checkpoint.
    pub fn new(device_id: impl Into<DeviceId>, last_sync_at: Timestamp) -> Self {
        Self {
            records: Vec::new(),
            deleted_ids: Vec::new(),
            attachments: Vec::new(),
            device_id: device_id.into(),
            last_sync_at,
        }
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn with_deleted_ids(mut self, deleted_ids: Vec<RecordId>) -> Self {
        self.deleted_ids = deleted_ids;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<AttachmentMeta>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// A record the engine could not reconcile automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub record_id: RecordId,
    /// The version the client submitted
    pub local_version: Record,
    /// The version held by the server
    pub remote_version: Record,
}

/// The server's answer to a [`SyncPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Server-side changes since the checkpoint, for the client to merge
    pub updated_records: Vec<Record>,
    pub deleted_ids: Vec<RecordId>,
    pub updated_attachments: Vec<AttachmentMeta>,
    /// The client's next checkpoint
    pub sync_timestamp: Timestamp,
    /// Unresolved conflicts; omitted when there are none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictReport>>,
}
