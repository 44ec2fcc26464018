//! Record routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tandem_engine::{ChangeEntry, Record};

use crate::auth::Authenticated;
use crate::error::Result;
use crate::handlers::{handle_delete, handle_export, handle_history, DeleteQuery};
use crate::AppState;

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(export_handler))
        .route("/records/{id}", delete(delete_handler))
        .route("/records/{id}/history", get(history_handler))
}

/// GET /records - Export every live record.
async fn export_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
) -> Result<Json<Vec<Record>>> {
    Ok(Json(handle_export(&state.engine).await?))
}

/// GET /records/{id}/history - Retained change history of a record.
async fn history_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChangeEntry>>> {
    Ok(Json(handle_history(&state.engine, &id).await?))
}

/// DELETE /records/{id} - Logically delete a record.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode> {
    handle_delete(&state.engine, &id, query).await?;
    Ok(StatusCode::NO_CONTENT)
}
