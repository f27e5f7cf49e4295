//! Backup run orchestration
//!
//! `BackupEngine` drives one run end to end: acquire the run lock against
//! the destination, index the source tree (checksums plus compressibility
//! sampling), flatten the result into manifest records, and release the
//! lock. The delta computation between source and destination trees is a
//! later pipeline stage and does not live in this crate.

use crate::cancel::CancelToken;
use crate::compress::CompressibilityClassifier;
use crate::config::{IndexerConfig, JobConfig};
use crate::error::Result;
use crate::lock::BackupRunLock;
use crate::manifest::Manifest;
use crate::scanner::{ScanCounters, TreeScanner};
use crate::tree::TreeDirectory;
use crate::vfs::{FileSystem, ReadOnlyFileSystem};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Aggregate results of one completed run
#[derive(Debug)]
pub struct RunSummary {
    /// Identifier assigned to this run
    pub run_id: Uuid,

    /// Total wall-clock duration
    pub duration: Duration,

    /// Directories indexed
    pub directories: u64,

    /// Files successfully hashed
    pub files_indexed: u64,

    /// Bytes of file content hashed
    pub bytes_indexed: u64,

    /// Paths that could not be indexed
    pub error_count: u64,

    /// Entries skipped by exclude patterns
    pub skipped: u64,

    /// Whether this was a dry run
    pub dry_run: bool,
}

impl RunSummary {
    /// Average indexing throughput over the whole run
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_indexed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Everything a run produces: the summary, the scanned tree, and the
/// manifest records ready for the external serializer.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub tree: TreeDirectory,
    pub manifest: Manifest,
}

/// Orchestrates lock acquisition, source indexing, and cleanup for a run
pub struct BackupEngine {
    config: IndexerConfig,
    scanner: TreeScanner,
    classifier: Option<Arc<CompressibilityClassifier>>,
}

impl BackupEngine {
    pub fn new(config: IndexerConfig) -> Self {
        let classifier = if config.probe_enabled {
            let classifier = Arc::new(CompressibilityClassifier::default());
            classifier.seed_common_formats();
            Some(classifier)
        } else {
            None
        };

        let scanner = TreeScanner::new(config.scan_options(classifier.clone()));

        Self {
            config,
            scanner,
            classifier,
        }
    }

    /// Live progress counters for the scan phase
    pub fn counters(&self) -> Arc<ScanCounters> {
        self.scanner.counters()
    }

    /// Execute one run.
    ///
    /// The source is always wrapped read-only. In a dry run no lock is
    /// taken and nothing touches the destination; otherwise the run lock
    /// is held for the duration and released (best-effort marker cleanup)
    /// on every exit path.
    pub fn run(
        &self,
        job: &JobConfig,
        source_fs: Arc<dyn FileSystem>,
        target_fs: Arc<dyn FileSystem>,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        job.validate()?;

        // The lock guard releases on every exit path below
        let lock = if job.dry_run {
            info!("Dry run: skipping destination lock");
            None
        } else {
            Some(BackupRunLock::acquire(
                Arc::clone(&target_fs),
                &job.destination_path,
                job.override_existing_lock,
            )?)
        };

        let run_id = lock.as_ref().map(|l| l.run_id()).unwrap_or_else(Uuid::new_v4);
        let started_at: chrono::DateTime<chrono::Utc> = chrono::Utc::now();
        debug!(start_time = %started_at.to_rfc3339(), "Run started");
        info!(
            run_id = %run_id,
            source = %job.source_path.display(),
            destination = %job.destination_path.display(),
            dry_run = job.dry_run,
            "Starting backup index run"
        );

        // Indexing must not be able to modify what it indexes
        let source_ro: Arc<dyn FileSystem> = Arc::new(ReadOnlyFileSystem::new(source_fs));

        let scan_start = Instant::now();
        let outcome = self.scanner.scan(source_ro, &job.source_path, cancel)?;
        debug!(
            duration_ms = scan_start.elapsed().as_millis() as u64,
            files = outcome.stats.files_indexed,
            "Source index complete"
        );

        if let Some(classifier) = &self.classifier {
            classifier.log_summary();
        }

        let manifest = Manifest::from_tree(&outcome.tree, job.source_path.to_string_lossy());

        // Delta computation against the destination happens in a later
        // pipeline stage, outside this crate

        if let Some(lock) = lock {
            lock.release();
        }

        let duration = start.elapsed();
        let summary = RunSummary {
            run_id,
            duration,
            directories: outcome.stats.directories,
            files_indexed: outcome.stats.files_indexed,
            bytes_indexed: outcome.stats.bytes_indexed,
            error_count: outcome.stats.errors,
            skipped: outcome.stats.skipped,
            dry_run: job.dry_run,
        };

        info!(
            run_id = %run_id,
            duration_secs = format_args!("{:.2}", duration.as_secs_f64()),
            files = summary.files_indexed,
            bytes = summary.bytes_indexed,
            errors = summary.error_count,
            throughput_mb_s = format_args!("{:.2}", summary.throughput_bytes_per_sec() / (1024.0 * 1024.0)),
            "Backup index run completed"
        );

        Ok(RunOutcome {
            summary,
            tree: outcome.tree,
            manifest,
        })
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use crate::lock::{process_lock_test_guard, MARKER_FILE_NAME};
    use crate::vfs::LocalFileSystem;
    use std::fs;

    fn sample_source() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("photos")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"some notes here").unwrap();
        fs::write(dir.path().join("photos/cat.raw"), vec![9u8; 10_000]).unwrap();
        dir
    }

    #[test]
    fn test_full_run_produces_manifest_and_cleans_up() {
        let _guard = process_lock_test_guard();
        let source = sample_source();
        let dest = tempfile::tempdir().unwrap();

        let engine = BackupEngine::new(IndexerConfig::default());
        let job = JobConfig::new(source.path(), dest.path());
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());

        let outcome = engine
            .run(&job, Arc::clone(&fs), Arc::clone(&fs), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.summary.files_indexed, 2);
        assert_eq!(outcome.summary.error_count, 0);
        assert_eq!(outcome.tree.child_file_count(), 2);
        assert_eq!(outcome.manifest.records.len(), 2);
        assert_eq!(outcome.manifest.hashed_count(), 2);
        assert!(!outcome.summary.dry_run);

        // Lock marker cleaned up after the run
        assert!(!dest.path().join(MARKER_FILE_NAME).exists());
    }

    #[test]
    fn test_dry_run_never_touches_destination() {
        let _guard = process_lock_test_guard();
        let source = sample_source();
        let dest = tempfile::tempdir().unwrap();

        let engine = BackupEngine::new(IndexerConfig::default());
        let mut job = JobConfig::new(source.path(), dest.path());
        job.dry_run = true;

        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
        let outcome = engine
            .run(&job, Arc::clone(&fs), Arc::clone(&fs), &CancelToken::new())
            .unwrap();

        assert!(outcome.summary.dry_run);
        assert_eq!(outcome.summary.files_indexed, 2);

        // No marker was ever created
        assert!(fs::read_dir(dest.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_lock_conflict_aborts_run() {
        let _guard = process_lock_test_guard();
        let source = sample_source();
        let dest = tempfile::tempdir().unwrap();

        // Simulate a crashed run's leftover marker
        fs::write(dest.path().join(MARKER_FILE_NAME), b"stale").unwrap();

        let engine = BackupEngine::new(IndexerConfig::default());
        let job = JobConfig::new(source.path(), dest.path());
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());

        let result = engine.run(&job, Arc::clone(&fs), Arc::clone(&fs), &CancelToken::new());
        assert!(matches!(result, Err(IndexerError::Lock(_))));

        // Override resumes
        let mut job = job;
        job.override_existing_lock = true;
        let outcome = engine
            .run(&job, Arc::clone(&fs), Arc::clone(&fs), &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.summary.files_indexed, 2);
        assert!(!dest.path().join(MARKER_FILE_NAME).exists());
    }

    #[test]
    fn test_invalid_job_rejected_before_locking() {
        let _guard = process_lock_test_guard();
        let dest = tempfile::tempdir().unwrap();

        let engine = BackupEngine::new(IndexerConfig::default());
        let job = JobConfig::new("/no/such/source", dest.path());
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());

        let result = engine.run(&job, Arc::clone(&fs), Arc::clone(&fs), &CancelToken::new());
        assert!(matches!(result, Err(IndexerError::Config(_))));

        // Validation failed before the marker layer ran
        assert!(!dest.path().join(MARKER_FILE_NAME).exists());
    }
}
