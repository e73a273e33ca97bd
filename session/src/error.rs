//! Error types for the session driver.

use crate::config::ConfigError;

/// Session error type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] tally_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog file error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan session has shut down")]
    Closed,
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
