//! Tandem Server - HTTP surface for the tandem sync engine.
//!
//! Clients push batches of record changes to `POST /sync` and receive
//! everything other devices changed since their last checkpoint. Storage
//! is PostgreSQL when `DATABASE_URL` is set and in-memory otherwise.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tandem_engine::{
    AllowAll, ApiKeys, ConflictResolver, FieldMerge, LastWriteWins, MemoryAdapter,
    StorageAdapter, SyncEngine,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ResolverKind};

/// The engine as the server runs it, over whichever adapter was configured.
pub type Engine = SyncEngine<Arc<dyn StorageAdapter>>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire an engine around `adapter` using the resolver and API keys from `config`.
    pub fn new(adapter: Arc<dyn StorageAdapter>, config: Config) -> Self {
        let mut engine = SyncEngine::new(adapter).with_shared_resolver(resolver(&config));
        engine = if config.api_keys.is_empty() {
            engine.with_validator(AllowAll)
        } else {
            engine.with_validator(ApiKeys::new(config.api_keys.iter().cloned()))
        };

        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }
}

/// Resolver selected by configuration.
pub fn resolver(config: &Config) -> Arc<dyn ConflictResolver> {
    match config.resolver {
        ResolverKind::LastWriteWins => Arc::new(LastWriteWins),
        ResolverKind::FieldMerge => Arc::new(FieldMerge),
    }
}

/// Build the storage adapter described by `config`.
pub async fn build_adapter(config: &Config) -> Result<Arc<dyn StorageAdapter>, db::PoolError> {
    match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.db_max_connections).await?;
            tracing::info!("Using PostgreSQL storage");
            let adapter = db::PgAdapter::new(pool)
                .with_conflict_detection(config.conflict_detection)
                .with_resolver(resolver(config))
                .with_change_log_buffer(config.change_log_buffer);
            Ok(Arc::new(adapter))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let adapter = MemoryAdapter::builder()
                .conflict_detection(config.conflict_detection)
                .shared_resolver(resolver(config))
                .change_log_buffer(config.change_log_buffer)
                .build();
            Ok(Arc::new(adapter))
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
