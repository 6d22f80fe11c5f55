//! Error types for the quote watcher.

use swap_client::error::ClientError;

use crate::config::ConfigError;

/// Main error type for the quote watcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment configuration error: {0}")]
    EnvConfig(#[from] envy::Error),

    #[error("Invalid settings: {0}")]
    Settings(#[from] swap_client::error::ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Token {0} is not listed by the backend")]
    UnknownToken(String),
}

pub type Result<T> = std::result::Result<T, Error>;
