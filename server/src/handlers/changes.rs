//! Changes handler - serves paginated incremental changes.

use crate::error::{AppError, Result};
use crate::Engine;
use serde::{Deserialize, Serialize};
use tandem_engine::{Page, Record, Timestamp};

/// Query parameters for a changes request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesQuery {
    /// Checkpoint from the previous sync (epoch when absent)
    pub since: Option<Timestamp>,
    /// Device asking for changes
    pub device_id: Option<String>,
    /// Maximum number of records to return
    pub limit: Option<usize>,
    /// Records to skip
    pub offset: Option<usize>,
}

/// Response for a changes request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    pub records: Vec<Record>,
    pub total: usize,
    pub has_more: bool,
    /// Offset to request the next page with, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

/// Default page size for changes.
pub const DEFAULT_LIMIT: usize = 100;

/// Maximum page size for changes.
pub const MAX_LIMIT: usize = 1000;

/// Process a changes request from a client.
pub async fn handle_changes(engine: &Engine, query: ChangesQuery) -> Result<ChangesResponse> {
    let device_id = query
        .device_id
        .ok_or_else(|| AppError::BadRequest("deviceId is required".to_string()))?;
    let limit = query
        .limit
        .map(|l| l.clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let since = query.since.unwrap_or_else(tandem_engine::epoch);

    let Page {
        records,
        total,
        has_more,
    } = engine.changes_page(since, &device_id, limit, offset).await?;

    let next_offset = has_more.then(|| offset + records.len());

    Ok(ChangesResponse {
        records,
        total,
        has_more,
        next_offset,
    })
}
