//! Sync endpoint routes.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tandem_engine::{SyncPayload, SyncResult};

use crate::auth::Authenticated;
use crate::error::Result;
use crate::handlers::{handle_changes, handle_sync, ChangesQuery, ChangesResponse};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_handler))
        .route("/changes", get(changes_handler))
}

/// POST /sync - Exchange changes with the server.
async fn sync_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(payload): Json<SyncPayload>,
) -> Result<Json<SyncResult>> {
    let result = handle_sync(&state.engine, payload).await?;
    Ok(Json(result))
}

/// GET /changes - Page through changes since a checkpoint.
async fn changes_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>> {
    let response = handle_changes(&state.engine, query).await?;
    Ok(Json(response))
}
