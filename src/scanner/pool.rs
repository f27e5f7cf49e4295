//! Bounded worker pool for file-indexing work units
//!
//! A fixed set of named OS threads consumes work units from a rendezvous
//! channel: submission hands a unit directly to an idle worker and blocks
//! while all workers are busy, so at most `capacity` units are ever in
//! flight. Each worker owns a current-thread tokio runtime for the
//! overlapped small-file read path, mirroring the one-connection-per-worker
//! layout of the walker this scanner grew out of.

use crate::error::ScanError;
use crossbeam_channel::{bounded, Sender};
use std::thread::JoinHandle;
use tokio::runtime::Runtime;
use tracing::{debug, error};

/// A unit of work executed on a pool worker. The worker passes in its own
/// async runtime for jobs that want overlapped I/O.
pub type Job = Box<dyn FnOnce(&Runtime) + Send + 'static>;

/// Fixed-capacity worker pool
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<(usize, JoinHandle<()>)>,
}

impl WorkerPool {
    /// Spawn `capacity` worker threads.
    ///
    /// Returns an error if a worker thread or its runtime cannot be
    /// created.
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        assert!(capacity > 0, "worker pool capacity must be positive");

        // Rendezvous channel: submission blocks until a worker is free
        let (sender, receiver) = bounded::<Job>(0);
        let mut workers = Vec::with_capacity(capacity);

        for id in 0..capacity {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("indexer-{}", id))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            error!(worker = id, error = %e, "Failed to build worker runtime");
                            return;
                        }
                    };

                    debug!(worker = id, "Worker starting");
                    while let Ok(job) = receiver.recv() {
                        job(&runtime);
                    }
                    debug!(worker = id, "Worker shutting down");
                })?;

            workers.push((id, handle));
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Submit a work unit, blocking until a worker accepts it.
    ///
    /// Panics if called after [`WorkerPool::join`] (the submit side is
    /// gone by then).
    pub fn submit(&self, job: Job) {
        self.sender
            .as_ref()
            .expect("pool already joined")
            .send(job)
            .expect("all workers exited before the pool was joined");
    }

    /// Close the submit side and block until every in-flight and queued
    /// work unit has completed.
    pub fn join(mut self) -> Result<(), ScanError> {
        // Dropping the sender disconnects the channel; workers drain
        // whatever is left and exit
        self.sender.take();

        let mut panicked = None;
        for (id, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(worker = id, "Worker panicked");
                panicked.get_or_insert(id);
            }
        }

        match panicked {
            Some(id) => Err(ScanError::WorkerPanicked { id }),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Disconnect so workers are not left blocked on recv if the pool
        // is dropped without an explicit join
        self.sender.take();
    }
}
