//! Reusable scratch-buffer pool for streaming reads
//!
//! Hashing a large tree reads every file through a scratch buffer; renting
//! buffers from a pool instead of allocating per call keeps the hot path
//! allocation-free. Buffers return to the pool on drop, so every exit path
//! including errors gives the buffer back.

use std::sync::Mutex;

/// Default scratch buffer size. 64 KiB lines up with common file system
/// block sizes.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Upper bound on idle buffers retained by the pool; beyond this, returned
/// buffers are simply dropped.
const MAX_POOLED_BUFFERS: usize = 64;

/// Pool of fixed-size scratch buffers
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            buffer_size,
        }
    }

    /// Size of the buffers this pool hands out
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Rent a buffer, reusing an idle one when available.
    ///
    /// The returned guard derefs to `[u8]` and gives the buffer back to the
    /// pool when dropped.
    pub fn rent(&self) -> PooledBuf<'_> {
        let reused = self
            .buffers
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop();

        PooledBuf {
            buf: Some(reused.unwrap_or_else(|| vec![0u8; self.buffer_size])),
            pool: self,
        }
    }

    /// Number of idle buffers currently held
    pub fn idle_count(&self) -> usize {
        self.buffers.lock().expect("buffer pool mutex poisoned").len()
    }

    fn give_back(&self, buf: Vec<u8>) {
        let mut buffers = self.buffers.lock().expect("buffer pool mutex poisoned");
        if buffers.len() < MAX_POOLED_BUFFERS {
            buffers.push(buf);
        }
    }
}

/// A scratch buffer rented from a [`BufferPool`], returned on drop
#[derive(Debug)]
pub struct PooledBuf<'a> {
    buf: Option<Vec<u8>>,
    pool: &'a BufferPool,
}

impl std::ops::Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().expect("buffer already returned")
    }
}

impl std::ops::DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().expect("buffer already returned")
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}
