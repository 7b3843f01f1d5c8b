//! Error types for the business operations bot

use thiserror::Error;

use crate::models::RateKind;

/// Result type alias for bot operations
pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Error, Debug)]
pub enum BotError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Malformed or missing command parameters. The payload is shown to the user.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient permissions for this command")]
    PermissionDenied,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("failed to get {rate} settings: {source}")]
    RateUnavailable {
        rate: RateKind,
        #[source]
        source: Box<BotError>,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BotError {
    pub fn invalid(message: impl Into<String>) -> Self {
        BotError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BotError::NotFound(message.into())
    }

    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        BotError::PersistenceFailure(format!("{}: {}", context, err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BotError::NotFound(_))
    }
}
