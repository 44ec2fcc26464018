//! HTTP route definitions.

mod attachments;
mod health;
mod records;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(records::routes())
        .merge(attachments::routes())
}
