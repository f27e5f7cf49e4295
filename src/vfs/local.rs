//! Local disk implementation of the [`FileSystem`] trait

use super::{FileStat, FileSystem};
use crate::error::{FsError, FsResult};
use async_trait::async_trait;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tracing::trace;

/// [`FileSystem`] backed by the local disk via `std::fs`, with `tokio::fs`
/// providing the overlapped read path.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn list_entries(&self, dir: &Path, want_dirs: bool) -> FsResult<Vec<PathBuf>> {
        if dir.is_file() {
            return Err(FsError::NotADirectory {
                path: dir.to_path_buf(),
            });
        }

        let entries = fs::read_dir(dir).map_err(|e| FsError::from_io(dir, e))?;
        let mut result = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| FsError::from_io(entry.path(), e))?;

            // Symlinks are neither followed nor indexed
            if file_type.is_symlink() {
                trace!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }

            if file_type.is_dir() == want_dirs {
                result.push(entry.path());
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.list_entries(dir, false)
    }

    fn list_directories(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.list_entries(dir, true)
    }

    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        let metadata = fs::metadata(path).map_err(|e| FsError::from_io(path, e))?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    fn open_read(&self, path: &Path) -> FsResult<Box<dyn Read + Send>> {
        let file = fs::File::open(path).map_err(|e| FsError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &Path, create_new: bool) -> FsResult<Box<dyn Write + Send>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(!create_new)
            .create_new(create_new)
            .truncate(!create_new)
            .open(path)
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    fn delete(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| FsError::from_io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn open_read_async(&self, path: &Path) -> FsResult<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    async fn stat_async(&self, path: &Path) -> FsResult<FileStat> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(FileStat {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    async fn delete_async(&self, path: &Path) -> FsResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }
}
