//! Error handling for the stratum mining client
//!
//! Error types covering the pool session, work parsing and configuration,
//! split into fatal (session-ending) and local (message-scoped) failures.

use thiserror::Error;

/// Result type alias for mining client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the stratum mining client
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Target parsing errors
    #[error("Invalid target: {message}")]
    Target { message: String },

    /// Nonce validation errors
    #[error("Invalid nonce: {message}")]
    Nonce { message: String },

    /// Malformed stratum payloads
    #[error("Stratum error: {message}")]
    Stratum { message: String },

    /// Subscribe or authorize rejected by the pool
    #[error("Handshake failed: {message}")]
    Handshake { message: String },

    /// Connection establishment errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// The pool closed the connection
    #[error("Connection closed by pool")]
    Disconnected,

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a target error
    pub fn target(message: impl Into<String>) -> Self {
        Self::Target {
            message: message.into(),
        }
    }

    /// Create a nonce error
    pub fn nonce(message: impl Into<String>) -> Self {
        Self::Nonce {
            message: message.into(),
        }
    }

    /// Create a stratum error
    pub fn stratum(message: impl Into<String>) -> Self {
        Self::Stratum {
            message: message.into(),
        }
    }

    /// Create a handshake error
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error ends the pool session.
    ///
    /// There is no reconnect tier: a fatal error terminates the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Handshake { .. }
                | Error::Network { .. }
                | Error::Disconnected
                | Error::Config { .. }
                | Error::Yaml(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Target { .. } => "target",
            Error::Nonce { .. } => "nonce",
            Error::Stratum { .. } => "stratum",
            Error::Handshake { .. } => "handshake",
            Error::Network { .. } => "network",
            Error::Disconnected => "disconnected",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}
