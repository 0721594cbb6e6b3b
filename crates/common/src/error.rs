use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Whether this error compromises the durable queue.
    ///
    /// Storage errors break the "delivered or abandoned" guarantee and must be
    /// surfaced at process level rather than swallowed by a retry loop.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Io(_) | AppError::Serialization(_))
    }
}
