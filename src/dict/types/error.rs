//! Custom error types for the lexivol crate.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum DictError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad signature, unsupported version token, or an unusable metadata block.
    /// Raised only while opening; the volume never becomes usable.
    #[error("Format error: {0}")]
    Format(String),

    /// Files of one multi-file volume disagree on their build timestamp.
    #[error("Volume file {path} has timestamp {found}, expected {expected}")]
    VolumeMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// A structural inconsistency found by `Volume::verify`.
    #[error("Verification failed at record {record}: {reason}")]
    Verify { record: u64, reason: String },

    /// A pointer resolved outside the region it must stay in.
    #[error("Illegal read at position {position} (limit {limit})")]
    IllegalRead { position: u64, limit: u64 },

    /// Data inside an already opened volume does not have the expected shape.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A collation table could not be parsed.
    #[error("Collation table error at line {line}: {reason}")]
    Collation { line: usize, reason: String },

    /// The short-index side cache could not be written or read.
    #[error("Index cache error: {0}")]
    Cache(String),

    /// A cooperative cancellation was observed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The volume has been closed.
    #[error("Volume is closed")]
    Closed,

    /// A handle names a volume that is not part of the collection.
    #[error("Unknown volume: {0}")]
    UnknownVolume(String),

    /// The worker pool no longer accepts jobs.
    #[error("Worker pool is shut down")]
    PoolClosed,

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A lock was poisoned, indicating a panic in another thread holding it.")]
    LockPoisoned,
}

impl From<serde_json::Error> for DictError {
    fn from(e: serde_json::Error) -> Self {
        DictError::InvalidFormat(format!("JSON: {}", e))
    }
}

impl From<bincode::Error> for DictError {
    fn from(e: bincode::Error) -> Self {
        DictError::Cache(e.to_string())
    }
}

/// A convenience `Result` type alias using the crate's `DictError` type.
pub type Result<T> = std::result::Result<T, DictError>;
