//! Sync handler - applies a client batch and returns server changes.

use crate::error::Result;
use crate::Engine;
use tandem_engine::{SyncPayload, SyncResult};

/// Process a sync request from a client.
pub async fn handle_sync(engine: &Engine, payload: SyncPayload) -> Result<SyncResult> {
    let device_id = payload.device_id.clone();
    let incoming = payload.records.len();

    let result = engine.apply_changes(payload).await?;

    if let Some(conflicts) = &result.conflicts {
        tracing::warn!(
            device_id = %device_id,
            conflicts = conflicts.len(),
            "Sync finished with unresolved conflicts"
        );
    }
    tracing::debug!(
        device_id = %device_id,
        incoming,
        outgoing = result.updated_records.len(),
        "Sync handled"
    );

    Ok(result)
}
