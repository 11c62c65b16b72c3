//! Storage error types

use thiserror::Error;

/// Failures raised by the encrypted pool and its connections
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(String),

    #[error("Database encryption error: {0}")]
    Encryption(String),

    #[error("Wrong encryption key or database not encrypted")]
    WrongKeyOrNotEncrypted,

    /// No pooled connection freed up in time
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Pool timeouts, dropped connections and SQLite BUSY/LOCKED are
    /// transient; key and query failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Rusqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// Classify a raw SQLCipher failure message as a key problem when it looks like
/// one.
pub(crate) fn looks_like_wrong_key(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("file is not a database")
        || lower.contains("file is encrypted")
        || lower.contains("database disk image is malformed")
        || lower.contains("notadb")
        || lower.contains("unsupported file format")
}
