//! Record handlers - export, history and deletion.

use crate::error::{AppError, Result};
use crate::Engine;
use serde::Deserialize;
use tandem_engine::{ChangeEntry, Record};

/// Query parameters for deleting a record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    /// Device performing the deletion
    pub device_id: Option<String>,
}

/// Every live record.
pub async fn handle_export(engine: &Engine) -> Result<Vec<Record>> {
    Ok(engine.export().await?)
}

/// Retained change-log history for one record.
pub async fn handle_history(engine: &Engine, record_id: &str) -> Result<Vec<ChangeEntry>> {
    Ok(engine.history(record_id).await?)
}

/// Logically delete a record on behalf of a device.
pub async fn handle_delete(engine: &Engine, record_id: &str, query: DeleteQuery) -> Result<()> {
    let device_id = query
        .device_id
        .ok_or_else(|| AppError::BadRequest("deviceId is required".to_string()))?;

    engine.delete_record(record_id, &device_id).await?;
    tracing::info!(record_id, device_id = %device_id, "Record deleted");
    Ok(())
}
