//! backup-indexer - Concurrent File-Tree Indexer for Differential Backups
//!
//! Indexes a directory tree ahead of a backup: walks directories in
//! parallel, computes per-file CRC32 checksums with bounded memory, tracks
//! per-file-type compression ratios so the pipeline can later decide what
//! is worth compressing without re-reading data, and guards the
//! destination with a two-layer run lock.
//!
//! # Features
//!
//! - **Bounded Parallel Scanning**: One work unit per directory on a
//!   fixed-capacity worker pool; per-file failures are collected, never
//!   fatal.
//!
//! - **Streaming Checksums**: CRC32 and XXH64 over pooled scratch buffers,
//!   with blocking and overlapped read paths split by file size.
//!
//! - **Compressibility Statistics**: Running mean/stddev of observed
//!   compression ratios per extension, classified against a confidence
//!   band.
//!
//! - **Run Locking**: A machine-wide handle plus an on-disk marker file
//!   keep two backups from colliding on the same destination.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BackupEngine                              │
//! │   BackupRunLock ──► TreeScanner ──► Manifest records            │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ one work unit per directory
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads (C)                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker C │     │
//! │  │stat+hash│  │stat+hash│  │stat+hash│         │stat+hash│     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │            │            │                    │          │
//! │       ▼            ▼            ▼                    ▼          │
//! │  ┌───────────────────────────────────────────────────────┐     │
//! │  │  per-directory file maps   +   shared failure queue   │     │
//! │  └───────────────────────────────────────────────────────┘     │
//! │                                                                 │
//! │  CompressibilityClassifier ◄── ratio probes (unknown types)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use backup_indexer::{
//!     BackupEngine, CancelToken, IndexerConfig, JobConfig, LocalFileSystem,
//! };
//! use std::sync::Arc;
//!
//! let engine = BackupEngine::new(IndexerConfig::default());
//! let job = JobConfig::new("/data", "/mnt/backup");
//! let fs = Arc::new(LocalFileSystem::new());
//!
//! let outcome = engine
//!     .run(&job, fs.clone(), fs, &CancelToken::new())
//!     .expect("run failed");
//! println!("indexed {} files", outcome.summary.files_indexed);
//! ```

pub mod cancel;
pub mod compress;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod lock;
pub mod manifest;
pub mod progress;
pub mod scanner;
pub mod stats;
pub mod tree;
pub mod vfs;

pub use cancel::CancelToken;
pub use compress::{Compressibility, CompressibilityClassifier, CompressionProbe};
pub use config::{CliArgs, IndexerConfig, JobConfig};
pub use engine::{BackupEngine, RunOutcome, RunSummary};
pub use error::{IndexerError, Result};
pub use lock::BackupRunLock;
pub use manifest::{FileRecord, Manifest};
pub use scanner::{ScanOptions, ScanOutcome, TreeScanner};
pub use stats::RunningStats;
pub use tree::{NameCasing, TreeDirectory, TreeFile};
pub use vfs::{FileSystem, LocalFileSystem, ReadOnlyFileSystem};
