//! Read-only wrapper over any [`FileSystem`]
//!
//! Forbids every mutating call against the wrapped system. The engine wraps
//! the backup source unconditionally and the destination during dry runs,
//! so indexing provably cannot modify what it indexes.

use super::{FileStat, FileSystem};
use crate::error::{FsError, FsResult};
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Wrapper rejecting write, create, and delete calls with
/// [`FsError::ReadOnly`]; all read calls delegate to the inner system.
pub struct ReadOnlyFileSystem {
    inner: Arc<dyn FileSystem>,
}

impl ReadOnlyFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FileSystem for ReadOnlyFileSystem {
    fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_files(dir)
    }

    fn list_directories(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_directories(dir)
    }

    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        self.inner.stat(path)
    }

    fn open_read(&self, path: &Path) -> FsResult<Box<dyn Read + Send>> {
        self.inner.open_read(path)
    }

    fn open_write(&self, _path: &Path, _create_new: bool) -> FsResult<Box<dyn Write + Send>> {
        Err(FsError::ReadOnly {
            operation: "open_write",
        })
    }

    fn delete(&self, _path: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly {
            operation: "delete",
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    async fn list_files_async(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_files_async(dir).await
    }

    async fn list_directories_async(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_directories_async(dir).await
    }

    async fn stat_async(&self, path: &Path) -> FsResult<FileStat> {
        self.inner.stat_async(path).await
    }

    async fn open_read_async(&self, path: &Path) -> FsResult<Box<dyn AsyncRead + Send + Unpin>> {
        self.inner.open_read_async(path).await
    }

    async fn delete_async(&self, _path: &Path) -> FsResult<()> {
        Err(FsError::ReadOnly {
            operation: "delete",
        })
    }
}
