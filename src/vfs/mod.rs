//! Virtual file system boundary
//!
//! The scanner and the run lock talk to storage through this trait rather
//! than `std::fs` directly, so tests can substitute synthetic trees and the
//! destination can be wrapped read-only.
//!
//! Every operation has a blocking form; listing, stat, read, and delete
//! also have suspension-capable forms. Most async forms default to
//! delegating to the blocking implementation; [`LocalFileSystem`]
//! overrides the read path with real overlapped I/O.

mod local;
mod readonly;

pub use local::LocalFileSystem;
pub use readonly::ReadOnlyFileSystem;

use crate::error::FsResult;
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncRead;

/// Metadata for a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes
    pub size: u64,

    /// Last modification time, if the backing store tracks one
    pub modified: Option<SystemTime>,
}

impl FileStat {
    /// Modification time as milliseconds since the Unix epoch, if known
    pub fn modified_ms(&self) -> Option<u64> {
        self.modified
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
    }
}

/// Abstract file system used by the scanner, the engine, and the run lock
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// List regular files directly inside `dir`
    fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>>;

    /// List subdirectories directly inside `dir`
    fn list_directories(&self, dir: &Path) -> FsResult<Vec<PathBuf>>;

    /// Fetch size and modification time for a file
    fn stat(&self, path: &Path) -> FsResult<FileStat>;

    /// Open a file for reading
    fn open_read(&self, path: &Path) -> FsResult<Box<dyn Read + Send>>;

    /// Open a file for writing. With `create_new`, creation fails if the
    /// file already exists (the lock-marker semantics); otherwise the file
    /// is created or truncated.
    fn open_write(&self, path: &Path, create_new: bool) -> FsResult<Box<dyn Write + Send>>;

    /// Delete a file
    fn delete(&self, path: &Path) -> FsResult<()>;

    /// Check whether a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Suspension-capable form of [`FileSystem::list_files`]
    async fn list_files_async(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.list_files(dir)
    }

    /// Suspension-capable form of [`FileSystem::list_directories`]
    async fn list_directories_async(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.list_directories(dir)
    }

    /// Suspension-capable form of [`FileSystem::stat`]
    async fn stat_async(&self, path: &Path) -> FsResult<FileStat> {
        self.stat(path)
    }

    /// Suspension-capable form of [`FileSystem::open_read`]. No default:
    /// the overlapped read path is the one place where a real async
    /// implementation matters.
    async fn open_read_async(&self, path: &Path) -> FsResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Suspension-capable form of [`FileSystem::delete`]
    async fn delete_async(&self, path: &Path) -> FsResult<()> {
        self.delete(path)
    }
}
