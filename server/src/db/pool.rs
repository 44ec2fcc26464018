//! Database connection pool management.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Errors raised while preparing the database.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to connect: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("failed to migrate: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Connect to PostgreSQL and bring the schema up to date.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<Pool, PoolError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
