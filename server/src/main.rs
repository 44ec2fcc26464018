//! Tandem Server binary.

use tandem_server::config::Config;
use tandem_server::{app, build_adapter, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tandem_server=debug,tandem_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        conflict_detection = ?config.conflict_detection,
        resolver = ?config.resolver,
        change_log_buffer = config.change_log_buffer,
        api_keys = config.api_keys.len(),
        "Starting Tandem Server on {}:{}",
        config.host,
        config.port
    );

    let adapter = build_adapter(&config).await?;
    let addr = format!("{}:{}", config.host, config.port);
    let app = app(AppState::new(adapter, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
