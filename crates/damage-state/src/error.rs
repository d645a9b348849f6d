//! Error types for damage-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while connecting to or preparing the database.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    #[error("Blob directory unavailable at {}: {source}", path.display())]
    BlobRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by [`AnalysisStore`](crate::AnalysisStore) and
/// [`BlobStore`](crate::BlobStore) operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record with this id is visible to the requesting user.
    #[error("Analysis not found: {id}")]
    NotFound { id: String },

    #[error("Image not found: {locator}")]
    BlobNotFound { locator: String },

    #[error("Invalid user id: {reason}")]
    InvalidUserId { reason: String },

    #[error("Invalid image locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be turned back into a record.
    #[error("Corrupt stored record: {0}")]
    Serialization(String),
}
