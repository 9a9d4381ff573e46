//! Error types for the memory subsystem.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::memory::core::ids::MemoryId;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Malformed write input (empty content, unknown content type, bad vector).
    #[error("validation error: {0}")]
    Validation(String),
    /// No record exists with the given id.
    #[error("memory not found: {0}")]
    NotFound(MemoryId),
    /// A stored row could not be decoded.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// HTTP client construction error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Required `SQLite` extension not available.
    #[error("sqlite-vec extension is not available; load it before opening the memory store")]
    SqliteVecUnavailable,
}

impl MemoryError {
    /// Shorthand for a [`MemoryError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for storage failures worth a single retry (busy or locked database).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(err) | Self::TokioSqlite(tokio_rusqlite::Error::Rusqlite(err)) => {
                is_busy(err)
            }
            _ => false,
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
