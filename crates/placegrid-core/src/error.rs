use thiserror::Error;

/// Application-wide error types for placegrid.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status code.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// The search API answered with a status other than `OK` / `ZERO_RESULTS`.
    #[error("Places API status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    ApiStatus {
        status: String,
        message: Option<String>,
    },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint could not be written or removed.
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error means durable state cannot be written.
    ///
    /// Only these errors are allowed to terminate an extraction run; every
    /// API-layer failure is absorbed by the search executor.
    pub fn is_resource_failure(&self) -> bool {
        matches!(
            self,
            AppError::Io(_) | AppError::CheckpointError(_) | AppError::SerializationError(_)
        )
    }
}
