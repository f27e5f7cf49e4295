//! Error types for backup-indexer
//!
//! This module defines the error hierarchy covering:
//! - Configuration and CLI validation errors
//! - Statistics accumulator validation errors
//! - Virtual file system errors
//! - Hashing and scan errors
//! - Run-lock conflicts
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Validation errors are rejected before any state mutation
//! - Per-file errors during a scan are recovered locally, never raised here

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the backup-indexer library
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Statistics accumulator errors
    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    /// File system errors
    #[error("File system error: {0}")]
    Fs(#[from] FsError),

    /// Hashing errors
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    /// Scan errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Run-lock errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid async read threshold
    #[error("Invalid async read threshold {bytes}: must be positive")]
    InvalidAsyncThreshold { bytes: u64 },

    /// Invalid hash buffer size
    #[error("Invalid hash buffer size {size}: must be between {min} and {max}")]
    InvalidBufferSize { size: usize, min: usize, max: usize },

    /// Invalid probe prefix cap
    #[error("Invalid probe prefix cap {bytes}: must be positive")]
    InvalidProbeCap { bytes: u64 },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Source path error
    #[error("Invalid source path '{path}': {reason}")]
    InvalidSourcePath { path: PathBuf, reason: String },

    /// Destination path error
    #[error("Invalid destination path '{path}': {reason}")]
    InvalidDestinationPath { path: PathBuf, reason: String },
}

/// Validation errors raised by the running statistics accumulator.
///
/// All of these are rejected synchronously, before any sample is stored.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum StatsError {
    /// Capacity hint of zero
    #[error("Capacity must be greater than zero")]
    InvalidCapacity,

    /// NaN or infinite sample
    #[error("Numeric sample must be a finite number, got {0}")]
    NonFiniteSample(f64),

    /// Offset outside the sample slice
    #[error("Offset {offset} is out of bounds for slice of length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },

    /// Offset + count past the end of the sample slice
    #[error("Offset {offset} + count {count} exceeds slice length {len}")]
    RangeOutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
}

/// Virtual file system errors
#[derive(Error, Debug)]
pub enum FsError {
    /// Path not found
    #[error("Path not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Permission denied
    #[error("Permission denied: '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Not a directory
    #[error("Not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Mutating operation attempted through a read-only wrapper
    #[error("File system is read-only: {operation} is not permitted")]
    ReadOnly { operation: &'static str },

    /// Underlying I/O failure with path context
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Wrap an I/O error with the path it occurred on, mapping the common
    /// kinds onto their dedicated variants.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied { path },
            _ => FsError::Io { path, source: err },
        }
    }

    /// Check if this error is recoverable at the per-file level
    /// (logged and queued rather than aborting the scan).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FsError::ReadOnly { .. })
    }
}

/// Streaming hash errors
#[derive(Error, Debug)]
pub enum HashError {
    /// I/O failure while reading the stream
    #[error("I/O error while hashing: {0}")]
    Io(#[from] std::io::Error),

    /// Cancellation observed between chunks
    #[error("Hashing cancelled")]
    Cancelled,
}

/// Scan errors that fail the scan as a whole.
///
/// Per-file and per-directory failures below the root are recovered locally
/// and reported through the scan's error collection instead.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Root directory could not be enumerated
    #[error("Cannot enumerate scan root '{path}': {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    /// Root-level cancellation
    #[error("Scan cancelled")]
    Cancelled,

    /// A worker thread panicked
    #[error("Scan worker {id} panicked")]
    WorkerPanicked { id: usize },

    /// Worker threads could not be spawned
    #[error("Failed to start scan workers: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Run-lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// The machine-wide process lock is held by another live run.
    /// This layer is never overridable.
    #[error("Another backup run is already active on this machine")]
    ConcurrentRun,

    /// The on-disk marker file already exists on the destination
    #[error("Lock marker already exists at '{path}'; a backup may be in progress (use override to resume after a crash)")]
    MarkerExists { path: PathBuf },

    /// Failed to create or write the process-layer lock file
    #[error("Failed to set up the process lock at '{path}': {source}")]
    ProcessLockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for IndexerError
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Result type alias for FsError
pub type FsResult<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_kinds() {
        let err = FsError::from_io(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, FsError::NotFound { .. }));

        let err = FsError::from_io(
            "/secret",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, FsError::PermissionDenied { .. }));
        assert!(err.is_recoverable());

        let err = FsError::ReadOnly { operation: "delete" };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let stats_err = StatsError::NonFiniteSample(f64::NAN);
        let top: IndexerError = stats_err.into();
        assert!(matches!(top, IndexerError::Stats(_)));
    }
}
