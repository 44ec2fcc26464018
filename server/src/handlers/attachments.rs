//! Attachment handlers - binary upload and download.

use crate::error::{AppError, Result};
use crate::Engine;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use serde::{Deserialize, Serialize};
use tandem_engine::AttachmentMeta;

/// Header naming the record an upload belongs to.
pub const RECORD_ID_HEADER: &str = "x-record-id";

/// Header carrying the original filename of an upload.
pub const FILENAME_HEADER: &str = "x-filename";

/// Response for an attachment upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Store an uploaded attachment, taking metadata from request headers.
pub async fn handle_upload(
    engine: &Engine,
    headers: &HeaderMap,
    content: Vec<u8>,
) -> Result<UploadResponse> {
    let record_id = header(headers, RECORD_ID_HEADER)
        .ok_or_else(|| AppError::BadRequest(format!("{} header is required", RECORD_ID_HEADER)))?;

    let meta = AttachmentMeta {
        id: String::new(),
        record_id: record_id.to_string(),
        mime_type: header(headers, CONTENT_TYPE.as_str())
            .unwrap_or("application/octet-stream")
            .to_string(),
        size: content.len() as u64,
        filename: header(headers, FILENAME_HEADER)
            .unwrap_or("attachment")
            .to_string(),
    };

    let id = engine.store_attachment(content, meta).await?;
    tracing::debug!(attachment_id = %id, record_id, "Attachment stored");
    Ok(UploadResponse { id })
}

/// Load an attachment and its metadata.
pub async fn handle_download(
    engine: &Engine,
    attachment_id: &str,
) -> Result<(AttachmentMeta, Vec<u8>)> {
    Ok(engine.fetch_attachment(attachment_id).await?)
}
