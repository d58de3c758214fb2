//! ChatRelay error types

use std::time::Duration;
use thiserror::Error;

/// ChatRelay error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent backend failure (tool error, bad response, upstream status)
    #[error("Agent error: {0}")]
    Agent(String),

    /// Agent call exceeded its deadline
    #[error("Agent call timed out after {0:?}")]
    Timeout(Duration),

    /// Outbound delivery failed because the connection is gone
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server lifecycle error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ChatRelay operations
pub type Result<T> = std::result::Result<T, Error>;
