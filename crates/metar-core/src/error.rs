//! Error types shared by the METAR cache crates.
//!
//! Only construction of a cache can fail in a way callers see. Once a cache
//! is running, each failed fetch attempt is classified as a [`NetworkError`]
//! and logged by the refresh loop, never surfaced through lookups.

use thiserror::Error;

/// Top-level error type for cache construction.
#[derive(Debug, Error)]
pub enum MetarError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl MetarError {
    /// Returns a short operator-facing description of the failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            MetarError::Network(e) => e.user_message(),
            MetarError::Config(e) => e.user_message(),
            MetarError::Runtime(_) => "The cache must be created inside a tokio runtime.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("HTTP client could not be built: {0}")]
    ClientBuild(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "Unable to reach the METAR feed.",
            NetworkError::Timeout => "The METAR feed did not answer in time.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The METAR feed is experiencing issues."
            }
            NetworkError::ServerError { .. } => "The METAR feed rejected the request.",
            NetworkError::ClientBuild(_) => "The HTTP client could not be initialized.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid cache configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_builder() {
            NetworkError::ClientBuild(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}
