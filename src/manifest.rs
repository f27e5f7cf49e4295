//! Manifest records for persisted file indexes
//!
//! The wire schema that stores a manifest is external to this crate; these
//! types only pin the record shape it carries: one record per file with
//! its relative path and the optional size / modification time / checksum
//! triplet filled in during the scan. Paths use `/` separators regardless
//! of host platform so manifests compare across machines.

use crate::tree::TreeDirectory;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One file entry in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the manifest root, `/`-separated
    pub path: String,

    /// File size in bytes, if known
    pub size: Option<u64>,

    /// Modification time in milliseconds since the Unix epoch, if known
    pub modified_ms: Option<u64>,

    /// CRC32 content checksum, if computed
    pub crc32: Option<u32>,
}

/// A flattened file index for one scanned root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest generation time (Unix timestamp, seconds)
    pub generated_at: i64,

    /// The root path this manifest was generated from
    pub root_path: String,

    /// One record per indexed file
    pub records: Vec<FileRecord>,
}

impl Manifest {
    /// Flatten a scanned tree into manifest records.
    ///
    /// Record order follows a depth-first walk but is not part of the
    /// contract; consumers key on `path`.
    pub fn from_tree(tree: &TreeDirectory, root_path: impl Into<String>) -> Self {
        let mut records = Vec::with_capacity(tree.child_file_count());
        collect_records(tree, "", &mut records);

        Self {
            generated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            root_path: root_path.into(),
            records,
        }
    }

    /// Number of records carrying a checksum
    pub fn hashed_count(&self) -> usize {
        self.records.iter().filter(|r| r.crc32.is_some()).count()
    }
}

fn collect_records(dir: &TreeDirectory, prefix: &str, records: &mut Vec<FileRecord>) {
    for file in dir.files.values() {
        let path = if prefix.is_empty() {
            file.name.clone()
        } else {
            format!("{}/{}", prefix, file.name)
        };
        records.push(FileRecord {
            path,
            size: file.size,
            modified_ms: file.modified_ms,
            crc32: file.crc32,
        });
    }

    for subdir in dir.subdirectories.values() {
        let child_prefix = if prefix.is_empty() {
            subdir.name.clone()
        } else {
            format!("{}/{}", prefix, subdir.name)
        };
        collect_records(subdir, &child_prefix, records);
    }
}
