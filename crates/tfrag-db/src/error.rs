//! Error types for tfrag-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tfrag-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in tfrag-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Store errors
    // ========================================================================
    #[error("Vector store I/O error at {path}: {message}")]
    StoreIo { path: PathBuf, message: String },

    #[error("Vector store parse error at {path}: {message}")]
    StoreParse { path: PathBuf, message: String },

    #[error("Vector store not found at {path}")]
    StoreNotFound { path: PathBuf },

    #[error("Vector store at {path} is incompatible: {reason}")]
    StoreIncompatible { path: PathBuf, reason: String },

    // ========================================================================
    // Collection errors
    // ========================================================================
    #[error("Collection '{name}' does not exist")]
    CollectionNotFound { name: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[cfg(feature = "lancedb")]
    #[error("LanceDB error: {message}")]
    LanceDb { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn store_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreIo {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn store_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(feature = "lancedb")]
impl From<lancedb::Error> for DbError {
    fn from(err: lancedb::Error) -> Self {
        Self::LanceDb {
            message: err.to_string(),
        }
    }
}
