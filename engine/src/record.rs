//! Record types for storing data.

use crate::{AttachmentId, RecordId, Timestamp, VersionVector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which version-vector adapters keep a record's vector in `meta`.
pub const VERSION_VECTOR_KEY: &str = "versionVector";

/// A data record, the unit of synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Globally unique identifier
    pub id: RecordId,
    /// Application-defined category, opaque to the engine
    #[serde(rename = "type")]
    pub record_type: String,
    /// The actual data payload (JSON value)
    pub data: Value,
    /// Set by whichever party last modified the record
    pub updated_at: Timestamp,
    /// Engine-internal annotations kept out of `data`
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Record {
    /// Create a new record stamped with the current time.
    pub fn new(id: impl Into<RecordId>, record_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            data,
            updated_at: crate::now(),
            meta: Map::new(),
        }
    }

    /// Replace the `updatedAt` timestamp.
    pub fn updated_at(mut self, timestamp: Timestamp) -> Self {
        self.updated_at = timestamp;
        self
    }

    /// Read the version vector from `meta`, empty when absent or malformed.
    pub fn version_vector(&self) -> VersionVector {
        self.meta
            .get(VERSION_VECTOR_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Store a version vector under `meta`.
    pub fn set_version_vector(&mut self, vector: &VersionVector) {
        self.meta
            .insert(VERSION_VECTOR_KEY.to_string(), vector.to_value());
    }

    /// Same id, type, payload and timestamp. `meta` is ignored.
    ///
    /// Timestamps are compared at microsecond precision, so a record read
    /// back from a relational store still matches the batch that wrote it.
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id
            && self.record_type == other.record_type
            && crate::truncate_micros(self.updated_at)
                == crate::truncate_micros(other.updated_at)
            && self.data == other.data
    }
}

/// Metadata describing a binary attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    /// Attachment identifier; adapters assign one when empty
    #[serde(default)]
    pub id: AttachmentId,
    /// Record the attachment belongs to
    pub record_id: RecordId,
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    pub filename: String,
}
