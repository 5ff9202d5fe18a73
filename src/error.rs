//! Top-level error types.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the exporter from starting or running.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
