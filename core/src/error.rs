//! Error types for the search core.
//!
//! Callers see [`SearchError`]. Cache backends report [`BackendError`], which
//! the cache layer logs and swallows, so it never crosses the engine boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// A required field was empty or a parameter was out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested document is not indexed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Postings, document frequencies and stored term counts disagree.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        SearchError::InvalidInput(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        SearchError::NotFound(msg.into())
    }

    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        SearchError::Corruption(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        SearchError::Config(msg.into())
    }
}

/// Failure talking to a cache backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("entry encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}
