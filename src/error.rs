//! Error types for the leave bot.

use std::path::PathBuf;

/// Error from background work such as a directory refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Slack error: {0}")]
    Slack(#[from] SlackError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the JSON files backing the directory and member stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Classify an I/O error for `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path },
            _ => StoreError::Io { path, source },
        }
    }
}

/// Slack Web API errors.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("HTTP error calling {method}: {reason}")]
    Http { method: String, reason: String },

    #[error("{method} failed: {error}")]
    Api { method: String, error: String },

    #[error("Invalid response from {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors reported back to the user issuing a subscription command.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Please specify one or more channels, separated by commas.")]
    Usage,

    #[error("These channels don't exist or I can't see them: {}", .0.join(", "))]
    InvalidChannels(Vec<String>),

    #[error("I couldn't look up your Slack profile, so I can't manage your channels.")]
    UnknownUser,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
