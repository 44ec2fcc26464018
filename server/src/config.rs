//! Configuration management for the server.

use std::env;
use tandem_engine::{ConflictDetection, DEFAULT_PRUNE_BUFFER};

/// Which resolver the engine applies to conflicting client writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverKind {
    #[default]
    LastWriteWins,
    FieldMerge,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; the in-memory adapter is used when absent
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections
    pub db_max_connections: u32,
    /// Accepted API keys; every credential is accepted when empty
    pub api_keys: Vec<String>,
    /// How adapters treat writes to existing records
    pub conflict_detection: ConflictDetection,
    /// Resolver used by the sync engine
    pub resolver: ResolverKind,
    /// Recent change-log entries kept by pruning
    pub change_log_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            db_max_connections: 10,
            api_keys: Vec::new(),
            conflict_detection: ConflictDetection::default(),
            resolver: ResolverKind::default(),
            change_log_buffer: DEFAULT_PRUNE_BUFFER,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);

        let port = match lookup("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidPort)?,
            None => defaults.port,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        let db_max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(max) => max
                .parse::<u32>()
                .ok()
                .filter(|max| *max > 0)
                .ok_or(ConfigError::InvalidMaxConnections)?,
            None => defaults.db_max_connections,
        };

        let api_keys = lookup("API_KEYS")
            .map(|keys| {
                keys.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let conflict_detection = match lookup("CONFLICT_DETECTION") {
            Some(mode) => mode
                .parse()
                .map_err(|_| ConfigError::InvalidConflictDetection(mode))?,
            None => defaults.conflict_detection,
        };

        let resolver = match lookup("CONFLICT_RESOLVER").as_deref() {
            None | Some("last-write-wins") => ResolverKind::LastWriteWins,
            Some("field-merge") => ResolverKind::FieldMerge,
            Some(other) => return Err(ConfigError::InvalidResolver(other.to_string())),
        };

        let change_log_buffer = match lookup("CHANGE_LOG_BUFFER") {
            Some(buffer) => buffer
                .parse()
                .map_err(|_| ConfigError::InvalidChangeLogBuffer)?,
            None => defaults.change_log_buffer,
        };

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            api_keys,
            conflict_detection,
            resolver,
            change_log_buffer,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid DATABASE_MAX_CONNECTIONS value")]
    InvalidMaxConnections,

    #[error("Invalid CONFLICT_DETECTION value: {0}")]
    InvalidConflictDetection(String),

    #[error("Invalid CONFLICT_RESOLVER value: {0}")]
    InvalidResolver(String),

    #[error("Invalid CHANGE_LOG_BUFFER value")]
    InvalidChangeLogBuffer,
}
