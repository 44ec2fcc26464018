//! Conflict resolution strategies.
//!
//! A resolver receives the stored ("existing") and client ("incoming")
//! versions of a record judged to conflict and returns the single version to
//! keep. Returning [`ResolveError`] means "cannot auto-resolve"; the engine
//! reports such records back to the client instead of failing the sync.

use crate::{Record, RecordId};
use serde_json::Value;
use thiserror::Error;

/// A resolver declined to produce a resolved version.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot resolve record {record_id}: {reason}")]
pub struct ResolveError {
    pub record_id: RecordId,
    pub reason: String,
}

impl ResolveError {
    pub fn new(record_id: impl Into<RecordId>, reason: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }
}

/// Capability for merging two conflicting versions of a record.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, existing: &Record, incoming: &Record) -> Result<Record, ResolveError>;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Record, &Record) -> Result<Record, ResolveError> + Send + Sync,
{
    fn resolve(&self, existing: &Record, incoming: &Record) -> Result<Record, ResolveError> {
        self(existing, incoming)
    }
}

/// Greater `updatedAt` wins; ties keep the existing version.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, existing: &Record, incoming: &Record) -> Result<Record, ResolveError> {
        if incoming.updated_at > existing.updated_at {
            Ok(incoming.clone())
        } else {
            Ok(existing.clone())
        }
    }
}

/// Shallow merge of top-level payload fields.
///
/// Fields present on both sides take the incoming value, fields present on
/// one side only are kept, and `updatedAt` becomes the later of the two.
/// Type and `meta` follow the incoming version. Payloads that are not both
/// JSON objects cannot be merged and are reported as conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMerge;

impl ConflictResolver for FieldMerge {
    fn resolve(&self, existing: &Record, incoming: &Record) -> Result<Record, ResolveError> {
        let (Value::Object(base), Value::Object(overlay)) = (&existing.data, &incoming.data) else {
            return Err(ResolveError::new(
                &incoming.id,
                "field merge requires object payloads",
            ));
        };

        let mut data = base.clone();
        for (key, value) in overlay {
            data.insert(key.clone(), value.clone());
        }

        let mut resolved = incoming.clone();
        resolved.data = Value::Object(data);
        resolved.updated_at = existing.updated_at.max(incoming.updated_at);
        Ok(resolved)
    }
}
