//! Attachment routes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::auth::Authenticated;
use crate::error::Result;
use crate::handlers::{handle_download, handle_upload, UploadResponse};
use crate::AppState;

/// Create attachment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/attachments", post(upload_handler))
        .route("/attachments/{id}", get(download_handler))
}

/// POST /attachments - Store the raw request body as an attachment.
async fn upload_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let response = handle_upload(&state.engine, &headers, body.to_vec()).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /attachments/{id} - Stream back stored attachment bytes.
async fn download_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let (meta, content) = handle_download(&state.engine, &id).await?;
    let disposition = format!("attachment; filename=\"{}\"", meta.filename.replace('"', ""));

    Ok((
        [(CONTENT_TYPE, meta.mime_type), (CONTENT_DISPOSITION, disposition)],
        content,
    ))
}
