//! Concurrent tree scanner
//!
//! Builds a fully detailed [`TreeDirectory`] for a root path: every file
//! stat'd and checksummed, every subdirectory descended. Directory
//! recursion runs on the calling thread and fans one work unit per
//! directory out to the bounded worker pool; each unit lists that
//! directory's files, stats and hashes them, and records the results into
//! the directory's own file map. No two units ever write the same map.
//!
//! Completion is a blocking rendezvous: after the recursion returns, the
//! submit side of the pool is closed and the workers are joined, so every
//! in-flight unit has finished before the tree is frozen and returned. The
//! queued/finished counters exist for progress reporting and are equal by
//! the time the scan returns.
//!
//! Per-file failures (permissions, transient I/O, cancellation) are logged
//! and pushed onto a shared failure queue; the scan continues. A directory
//! listing failure below the root skips that subtree only. The scan as a
//! whole fails only when the root cannot be enumerated or the scan is
//! cancelled.

use crate::cancel::CancelToken;
use crate::compress::{Compressibility, CompressibilityClassifier, CompressionProbe};
use crate::error::{HashError, ScanError};
use crate::hash::{self, BufferPool, DEFAULT_BUFFER_SIZE};
use crate::scanner::pool::WorkerPool;
use crate::tree::{NameCasing, TreeDirectory, TreeFile};
use crate::vfs::FileSystem;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, trace, warn};

/// Default worker pool capacity for file I/O
pub const DEFAULT_FILE_IO_WORKERS: usize = 8;

/// Default size split between the overlapped and blocking read paths
pub const DEFAULT_ASYNC_READ_THRESHOLD: u64 = 1024 * 1024;

/// Scanner configuration
#[derive(Clone)]
pub struct ScanOptions {
    /// Worker pool capacity (bound on concurrent file-I/O units)
    pub worker_count: usize,

    /// Files smaller than this are hashed through the overlapped read
    /// path; files at or above it use blocking reads
    pub async_read_threshold: u64,

    /// Scratch buffer size for checksum reads
    pub hash_buffer_size: usize,

    /// Paths matching any of these patterns are skipped
    pub exclude_patterns: Vec<Regex>,

    /// Name-casing policy for tree map keys
    pub casing: NameCasing,

    /// When set, successfully hashed files whose extension still
    /// classifies as unknown are probed for their compression ratio
    pub classifier: Option<Arc<CompressibilityClassifier>>,

    /// Prefix cap for the compression probe
    pub probe: CompressionProbe,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_FILE_IO_WORKERS,
            async_read_threshold: DEFAULT_ASYNC_READ_THRESHOLD,
            hash_buffer_size: DEFAULT_BUFFER_SIZE,
            exclude_patterns: Vec::new(),
            casing: NameCasing::host_default(),
            classifier: None,
            probe: CompressionProbe::default(),
        }
    }
}

impl ScanOptions {
    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let text = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&text))
    }
}

/// Progress counters shared between the scan and its progress reporter.
/// All fields are atomics; reads are safe at any point during the scan.
#[derive(Debug, Default)]
pub struct ScanCounters {
    /// Work units submitted to the pool
    pub queued: AtomicU64,

    /// Work units completed (success or failure)
    pub finished: AtomicU64,

    /// Files successfully stat'd and hashed
    pub files_indexed: AtomicU64,

    /// Bytes of file content hashed
    pub bytes_indexed: AtomicU64,

    /// Per-file and per-directory failures recorded
    pub errors: AtomicU64,

    /// Entries skipped by exclude patterns
    pub skipped: AtomicU64,
}

impl ScanCounters {
    fn reset(&self) {
        self.queued.store(0, Ordering::SeqCst);
        self.finished.store(0, Ordering::SeqCst);
        self.files_indexed.store(0, Ordering::SeqCst);
        self.bytes_indexed.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
        self.skipped.store(0, Ordering::SeqCst);
    }

    fn record_file(&self, bytes: u64) {
        self.files_indexed.fetch_add(1, Ordering::Relaxed);
        self.bytes_indexed.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot for progress display
    pub fn progress(&self, elapsed: Duration) -> ScanProgress {
        ScanProgress {
            queued: self.queued.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            files: self.files_indexed.load(Ordering::Relaxed),
            bytes: self.bytes_indexed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time view of a running scan
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub queued: u64,
    pub finished: u64,
    pub files: u64,
    pub bytes: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Files hashed per second since the scan started
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}

/// A path that could not be indexed, with the reason
#[derive(Debug, Clone)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Aggregate results of a completed scan
#[derive(Debug)]
pub struct ScanStats {
    /// Wall-clock scan duration
    pub duration: Duration,

    /// Directories whose work units completed
    pub directories: u64,

    /// Files successfully hashed
    pub files_indexed: u64,

    /// Bytes hashed
    pub bytes_indexed: u64,

    /// Per-file and per-directory failures
    pub errors: u64,

    /// Entries skipped by exclude patterns
    pub skipped: u64,
}

/// Result of a completed scan: the frozen tree plus stats and failures
#[derive(Debug)]
pub struct ScanOutcome {
    /// Root of the scanned tree (named ".")
    pub tree: TreeDirectory,

    /// Aggregate statistics
    pub stats: ScanStats,

    /// Every path that ended up unindexed, with the reason
    pub failures: Vec<ScanFailure>,
}

/// Shared state visible to the descent loop and every work unit
struct ScanShared {
    fs: Arc<dyn FileSystem>,
    options: ScanOptions,
    counters: Arc<ScanCounters>,
    failures: crossbeam_channel::Sender<ScanFailure>,
    cancel: CancelToken,
    buffers: Arc<BufferPool>,
}

/// Interior-mutable tree node used while the scan is live. Each node's
/// file map is written only by the work unit that owns the directory; the
/// subdirectory list is written only by the descent thread.
struct DirNodeBuilder {
    name: String,
    files: Mutex<HashMap<String, TreeFile>>,
    subdirs: Mutex<Vec<(String, Arc<DirNodeBuilder>)>>,
}

impl DirNodeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Mutex::new(HashMap::new()),
            subdirs: Mutex::new(Vec::new()),
        }
    }

    /// Convert into the plain owned result tree. Called only after the
    /// worker rendezvous, when no other reference can mutate the node.
    fn freeze(&self) -> TreeDirectory {
        let files = std::mem::take(&mut *self.files.lock().expect("file map mutex poisoned"));
        let subdirs =
            std::mem::take(&mut *self.subdirs.lock().expect("subdir list mutex poisoned"));

        let mut subdirectories = HashMap::with_capacity(subdirs.len());
        for (key, child) in subdirs {
            subdirectories.insert(key, child.freeze());
        }

        TreeDirectory {
            name: self.name.clone(),
            subdirectories,
            files,
        }
    }
}

/// Concurrent recursive directory scanner
pub struct TreeScanner {
    options: ScanOptions,
    counters: Arc<ScanCounters>,
}

impl TreeScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            counters: Arc::new(ScanCounters::default()),
        }
    }

    /// Progress counters for this scanner. Readable concurrently with a
    /// running scan; reset when a new scan starts.
    pub fn counters(&self) -> Arc<ScanCounters> {
        Arc::clone(&self.counters)
    }

    /// Scan `root` through `fs`, returning the fully hashed tree.
    ///
    /// Fails only when the root cannot be enumerated, the scan is
    /// cancelled, or a worker panics; everything else is recorded in the
    /// outcome's failure list.
    pub fn scan(
        &self,
        fs: Arc<dyn FileSystem>,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();
        self.counters.reset();

        let (failure_tx, failure_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(ScanShared {
            fs,
            options: self.options.clone(),
            counters: Arc::clone(&self.counters),
            failures: failure_tx,
            cancel: cancel.clone(),
            buffers: Arc::new(BufferPool::new(self.options.hash_buffer_size)),
        });

        let pool = WorkerPool::new(self.options.worker_count)?;

        debug!(
            root = %root.display(),
            workers = self.options.worker_count,
            casing = ?self.options.casing,
            "Starting tree scan"
        );

        let root_node = Arc::new(DirNodeBuilder::new("."));
        let descent = descend(&shared, &pool, &root_node, root.to_path_buf(), 0);

        // Rendezvous: close the submit side and wait for every in-flight
        // work unit before touching the tree
        drop(shared);
        pool.join()?;

        debug_assert_eq!(
            self.counters.queued.load(Ordering::SeqCst),
            self.counters.finished.load(Ordering::SeqCst),
        );

        descent?;

        let failures: Vec<ScanFailure> = failure_rx.try_iter().collect();
        let tree = root_node.freeze();
        let duration = start.elapsed();

        debug!(
            files = self.counters.files_indexed.load(Ordering::Relaxed),
            errors = failures.len(),
            duration_ms = duration.as_millis() as u64,
            "Tree scan finished"
        );

        Ok(ScanOutcome {
            tree,
            stats: ScanStats {
                duration,
                directories: self.counters.finished.load(Ordering::Relaxed),
                files_indexed: self.counters.files_indexed.load(Ordering::Relaxed),
                bytes_indexed: self.counters.bytes_indexed.load(Ordering::Relaxed),
                errors: self.counters.errors.load(Ordering::Relaxed),
                skipped: self.counters.skipped.load(Ordering::Relaxed),
            },
            failures,
        })
    }
}

/// Increment `finished` when dropped, so completion is recorded on every
/// exit path out of a work unit, including panics.
struct FinishGuard<'a>(&'a ScanCounters);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Depth-first descent on the calling thread. Submits one file-indexing
/// work unit per directory, then recurses into subdirectories.
fn descend(
    shared: &Arc<ScanShared>,
    pool: &WorkerPool,
    node: &Arc<DirNodeBuilder>,
    dir: PathBuf,
    depth: u32,
) -> Result<(), ScanError> {
    if shared.cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    trace!(dir = %dir.display(), "Indexing directory");

    // One work unit per directory: list, stat, and hash its files
    shared.counters.queued.fetch_add(1, Ordering::SeqCst);
    {
        let shared = Arc::clone(shared);
        let node = Arc::clone(node);
        let dir = dir.clone();
        pool.submit(Box::new(move |rt: &Runtime| {
            let _guard = FinishGuard(&shared.counters);
            process_directory(&shared, rt, &node, &dir);
        }));
    }

    let subdirs = match shared.fs.list_directories(&dir) {
        Ok(subdirs) => subdirs,
        Err(e) if depth == 0 => {
            return Err(ScanError::RootUnreadable {
                path: dir,
                source: e,
            });
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list subdirectories");
            shared.counters.record_error();
            let _ = shared.failures.send(ScanFailure {
                path: dir,
                reason: e.to_string(),
            });
            return Ok(());
        }
    };

    for subdir in subdirs {
        if shared.options.is_excluded(&subdir) {
            shared.counters.record_skip();
            continue;
        }

        let name = match subdir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        let child = Arc::new(DirNodeBuilder::new(name.clone()));
        node.subdirs
            .lock()
            .expect("subdir list mutex poisoned")
            .push((shared.options.casing.key(&name), Arc::clone(&child)));

        descend(shared, pool, &child, subdir, depth + 1)?;
    }

    Ok(())
}

/// Work unit body: index every file directly inside `dir` into `node`.
fn process_directory(shared: &ScanShared, rt: &Runtime, node: &DirNodeBuilder, dir: &Path) {
    let files = match shared.fs.list_files(dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot list files");
            shared.counters.record_error();
            let _ = shared.failures.send(ScanFailure {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            });
            return;
        }
    };

    for file in files {
        if shared.options.is_excluded(&file) {
            shared.counters.record_skip();
            continue;
        }

        match index_file(shared, rt, &file) {
            Ok(tree_file) => {
                let size = tree_file.size.unwrap_or(0);
                let key = shared.options.casing.key(&tree_file.name);
                node.files
                    .lock()
                    .expect("file map mutex poisoned")
                    .insert(key, tree_file);
                shared.counters.record_file(size);
            }
            Err(reason) => {
                warn!(file = %file.display(), error = %reason, "Failed to index file");
                shared.counters.record_error();
                let _ = shared.failures.send(ScanFailure {
                    path: file,
                    reason,
                });
            }
        }
    }
}

/// Stat and checksum one file, optionally feeding the compressibility
/// classifier. Any failure is reported as a per-file reason string.
fn index_file(shared: &ScanShared, rt: &Runtime, file: &Path) -> Result<TreeFile, String> {
    if shared.cancel.is_cancelled() {
        return Err(HashError::Cancelled.to_string());
    }

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Path '{}' has no file name", file.display()))?;

    let mut tree_file = TreeFile::new(name);

    let stat = shared.fs.stat(file).map_err(|e| e.to_string())?;
    tree_file.size = Some(stat.size);
    tree_file.modified_ms = stat.modified_ms();

    // Small files go through the overlapped read path on the worker's own
    // runtime; large files read better with plain blocking I/O
    let crc = if stat.size < shared.options.async_read_threshold {
        rt.block_on(async {
            let mut reader = shared
                .fs
                .open_read_async(file)
                .await
                .map_err(|e| e.to_string())?;
            hash::crc32_reader_async(&mut *reader, &shared.buffers, &shared.cancel)
                .await
                .map_err(|e| e.to_string())
        })?
    } else {
        let mut reader = shared.fs.open_read(file).map_err(|e| e.to_string())?;
        hash::crc32_reader(&mut *reader, &shared.buffers, &shared.cancel)
            .map_err(|e| e.to_string())?
    };
    tree_file.crc32 = Some(crc);

    observe_compressibility(shared, file, stat.size);

    Ok(tree_file)
}

/// Probe the compression ratio of files whose extension has no verdict
/// yet. Probe failures are debug-logged and never count against the file:
/// its checksum is already recorded.
fn observe_compressibility(shared: &ScanShared, file: &Path, size: u64) {
    let Some(classifier) = shared.options.classifier.as_ref() else {
        return;
    };
    if size == 0 {
        return;
    }

    let Some(extension) = file.extension().map(|e| e.to_string_lossy().into_owned()) else {
        return;
    };
    if classifier.classify(&extension) != Compressibility::Unknown {
        return;
    }

    match shared.fs.open_read(file) {
        Ok(mut reader) => match shared.options.probe.probe(&mut *reader) {
            Ok(Some(ratio)) => classifier.observe(&extension, ratio),
            Ok(None) => {}
            Err(e) => {
                debug!(file = %file.display(), error = %e, "Compression probe failed")
            }
        },
        Err(e) => debug!(file = %file.display(), error = %e, "Compression probe open failed"),
    }
}
