//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while parsing a query or running a scan
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Request parameters failed validation
    #[error("{0}")]
    InvalidQuery(String),

    /// A search pattern could not be compiled for scanning
    #[error("invalid search pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The artifact source could not list or read artifacts
    #[error("artifact source failed: {0}")]
    Source(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A scan worker stopped unexpectedly
    #[error("scan worker failed: {0}")]
    Worker(String),

    /// The match callback rejected an event
    #[error("match handler failed: {0}")]
    Handler(String),

    /// The caller cancelled the scan
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            SearchError::Cancelled
        } else {
            SearchError::Worker(err.to_string())
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(msg) => AppError::Validation(msg),
            SearchError::Cancelled => AppError::Cancelled,
            _ => AppError::Scan(err.to_string()),
        }
    }
}
