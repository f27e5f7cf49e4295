//! Concurrent file-tree scanning
//!
//! The scanner descends a directory tree depth-first on the calling thread
//! and fans per-directory file-indexing work out to a bounded worker pool:
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         TreeScanner          │
//!                  │  - descent on calling thread │
//!                  │  - one work unit / directory │
//!                  └──────────────┬───────────────┘
//!                                 │ rendezvous channel (bounded)
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!  ┌─────▼─────┐            ┌─────▼─────┐            ┌─────▼─────┐
//!  │ Worker 1  │            │ Worker 2  │            │ Worker C  │
//!  │ stat+hash │            │ stat+hash │            │ stat+hash │
//!  │ own tokio │            │ own tokio │            │ own tokio │
//!  └───────────┘            └───────────┘            └───────────┘
//! ```
//!
//! Per-file failures land in a shared failure queue and never abort the
//! scan; the result tree is frozen and returned only after every worker
//! has drained.

pub mod pool;
pub mod scan;

pub use pool::WorkerPool;
pub use scan::{
    ScanCounters, ScanFailure, ScanOptions, ScanOutcome, ScanProgress, ScanStats, TreeScanner,
    DEFAULT_ASYNC_READ_THRESHOLD, DEFAULT_FILE_IO_WORKERS,
};
