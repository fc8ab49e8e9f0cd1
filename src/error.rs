//! Error types
//!
//! `StoreError` covers the persistence seam, `EngineError` is what callers of
//! the session boundary can observe. Text input never produces an error.

use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the backend is gone entirely rather than failing one write
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors surfaced by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Resolution cancelled")]
    Cancelled,
    #[error("Resolution timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StorageUnavailable(e.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
