//! Error types for the signature-analysis library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Build a network error tagged with the failing operation.
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;
