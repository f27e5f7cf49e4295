//! Configuration types for backup-indexer
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Validated runtime configuration
//! - The job description identifying one backup run

use crate::compress::{CompressibilityClassifier, CompressionProbe, DEFAULT_PROBE_PREFIX_CAP};
use crate::error::ConfigError;
use crate::hash::DEFAULT_BUFFER_SIZE;
use crate::scanner::{ScanOptions, DEFAULT_ASYNC_READ_THRESHOLD, DEFAULT_FILE_IO_WORKERS};
use crate::tree::NameCasing;
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Hash scratch buffer bounds
const MIN_BUFFER_SIZE: usize = 4 * 1024;
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Concurrent file-tree indexer for differential backups
#[derive(Parser, Debug, Clone)]
#[command(
    name = "backup-indexer",
    version,
    about = "Concurrent file-tree indexer for differential backups",
    long_about = "Indexes a source directory tree for backup: walks directories in parallel,\n\
                  computes per-file CRC32 checksums, and tracks per-file-type compression\n\
                  ratios so the backup pipeline can decide later what is worth compressing.\n\n\
                  A two-layer run lock (machine-wide handle + on-disk marker) prevents two\n\
                  backups from colliding on the same destination.",
    after_help = "EXAMPLES:\n    \
        backup-indexer /home/me /mnt/backup\n    \
        backup-indexer /data /mnt/backup -w 16 --exclude '\\.cache'\n    \
        backup-indexer /data /mnt/backup --override-lock   # resume after a crash\n    \
        backup-indexer /data /mnt/backup --dry-run -v"
)]
pub struct CliArgs {
    /// Source directory to index
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Backup destination directory (owns the lock marker)
    #[arg(value_name = "DEST")]
    pub destination: PathBuf,

    /// Number of worker threads for file I/O
    #[arg(short = 'w', long, default_value_t = DEFAULT_FILE_IO_WORKERS, value_name = "NUM")]
    pub workers: usize,

    /// Files smaller than this use overlapped reads; larger ones use
    /// blocking reads
    #[arg(long, default_value_t = DEFAULT_ASYNC_READ_THRESHOLD, value_name = "BYTES")]
    pub async_threshold: u64,

    /// Scratch buffer size for checksum reads
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, value_name = "BYTES")]
    pub hash_buffer_size: usize,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Index without locking the destination or writing anything to it
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed past an existing lock marker (resume a crashed run).
    /// Never bypasses the machine-wide process lock.
    #[arg(long = "override-lock")]
    pub override_lock: bool,

    /// Disable compression-ratio probing
    #[arg(long)]
    pub no_probe: bool,

    /// Maximum prefix read per file by the compression probe
    #[arg(long, default_value_t = DEFAULT_PROBE_PREFIX_CAP, value_name = "BYTES")]
    pub probe_cap: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug-level logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Worker pool capacity for file I/O
    pub worker_count: usize,

    /// Small/large file read-path split
    pub async_read_threshold: u64,

    /// Checksum scratch buffer size
    pub hash_buffer_size: usize,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Whether to probe compression ratios during the scan
    pub probe_enabled: bool,

    /// Probe prefix cap
    pub probe_cap: u64,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_FILE_IO_WORKERS,
            async_read_threshold: DEFAULT_ASYNC_READ_THRESHOLD,
            hash_buffer_size: DEFAULT_BUFFER_SIZE,
            exclude_patterns: Vec::new(),
            probe_enabled: true,
            probe_cap: DEFAULT_PROBE_PREFIX_CAP,
            show_progress: false,
            verbose: false,
        }
    }
}

impl IndexerConfig {
    /// Validate CLI arguments into a runtime configuration
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.async_threshold == 0 {
            return Err(ConfigError::InvalidAsyncThreshold {
                bytes: args.async_threshold,
            });
        }

        if args.hash_buffer_size < MIN_BUFFER_SIZE || args.hash_buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize {
                size: args.hash_buffer_size,
                min: MIN_BUFFER_SIZE,
                max: MAX_BUFFER_SIZE,
            });
        }

        if args.probe_cap == 0 {
            return Err(ConfigError::InvalidProbeCap {
                bytes: args.probe_cap,
            });
        }

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            worker_count: args.workers,
            async_read_threshold: args.async_threshold,
            hash_buffer_size: args.hash_buffer_size,
            exclude_patterns,
            probe_enabled: !args.no_probe,
            probe_cap: args.probe_cap,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Build scanner options from this configuration
    pub fn scan_options(
        &self,
        classifier: Option<Arc<CompressibilityClassifier>>,
    ) -> ScanOptions {
        ScanOptions {
            worker_count: self.worker_count,
            async_read_threshold: self.async_read_threshold,
            hash_buffer_size: self.hash_buffer_size,
            exclude_patterns: self.exclude_patterns.clone(),
            casing: NameCasing::host_default(),
            classifier,
            probe: CompressionProbe::new(self.probe_cap),
        }
    }
}

/// Identity of one backup run
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Directory tree to index
    pub source_path: PathBuf,

    /// Backup destination (owns the lock marker)
    pub destination_path: PathBuf,

    /// Index without locking or touching the destination
    pub dry_run: bool,

    /// Proceed past an existing lock marker (marker layer only)
    pub override_existing_lock: bool,
}

impl JobConfig {
    pub fn new(source_path: impl Into<PathBuf>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            dry_run: false,
            override_existing_lock: false,
        }
    }

    /// Validate that the job's paths exist and are directories
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source_path.is_dir() {
            return Err(ConfigError::InvalidSourcePath {
                path: self.source_path.clone(),
                reason: "not an existing directory".into(),
            });
        }

        if !self.dry_run && !self.destination_path.is_dir() {
            return Err(ConfigError::InvalidDestinationPath {
                path: self.destination_path.clone(),
                reason: "not an existing directory".into(),
            });
        }

        Ok(())
    }
}
