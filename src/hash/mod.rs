//! Streaming checksum calculation
//!
//! Two independent digests over arbitrary byte streams with bounded memory:
//!
//! - CRC32 for the per-file checksum recorded in the scanned tree
//! - XXH64 for fast non-cryptographic content fingerprints
//!
//! Each algorithm has a blocking variant over [`std::io::Read`] and an
//! async variant over [`tokio::io::AsyncRead`]; both read through a scratch
//! buffer rented from a [`BufferPool`] and produce identical digests for
//! identical content regardless of path or buffer size. Cancellation is
//! checked between chunks.

mod bufpool;

pub use bufpool::{BufferPool, PooledBuf, DEFAULT_BUFFER_SIZE};

use crate::cancel::CancelToken;
use crate::error::HashError;
use std::hash::Hasher as _;
use std::io::Read;
use tokio::io::{AsyncRead, AsyncReadExt};
use twox_hash::XxHash64;

/// Seed for the XXH64 digest. Fixed so digests are comparable across runs.
const XXH64_SEED: u64 = 0;

/// Compute the CRC32 checksum of everything remaining in `reader`.
///
/// Reads until end-of-stream; a zero-length read terminates.
pub fn crc32_reader(
    reader: &mut dyn Read,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u32, HashError> {
    let mut hasher = crc32fast::Hasher::new();
    let mut scratch = pool.rent();

    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        let read_size = reader.read(&mut scratch)?;
        if read_size == 0 {
            break;
        }

        hasher.update(&scratch[..read_size]);
    }

    Ok(hasher.finalize())
}

/// Async variant of [`crc32_reader`]; identical digest for identical content.
pub async fn crc32_reader_async<R>(
    reader: &mut R,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u32, HashError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = crc32fast::Hasher::new();
    let mut scratch = pool.rent();

    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        let read_size = reader.read(&mut scratch).await?;
        if read_size == 0 {
            break;
        }

        hasher.update(&scratch[..read_size]);
    }

    Ok(hasher.finalize())
}

/// Compute the XXH64 digest of everything remaining in `reader`.
pub fn xxh64_reader(
    reader: &mut dyn Read,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u64, HashError> {
    let mut hasher = XxHash64::with_seed(XXH64_SEED);
    let mut scratch = pool.rent();

    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        let read_size = reader.read(&mut scratch)?;
        if read_size == 0 {
            break;
        }

        hasher.write(&scratch[..read_size]);
    }

    Ok(hasher.finish())
}

/// Async variant of [`xxh64_reader`]; identical digest for identical content.
pub async fn xxh64_reader_async<R>(
    reader: &mut R,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u64, HashError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = XxHash64::with_seed(XXH64_SEED);
    let mut scratch = pool.rent();

    loop {
        if cancel.is_cancelled() {
            return Err(HashError::Cancelled);
        }

        let read_size = reader.read(&mut scratch).await?;
        if read_size == 0 {
            break;
        }

        hasher.write(&scratch[..read_size]);
    }

    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_content() -> Vec<u8> {
        // Varied content larger than one scratch buffer
        (0..200_000u32).flat_map(|i| i.to_le_bytes()).collect()
    }

    #[test]
    fn test_crc32_deterministic() {
        let content = sample_content();
        let pool = BufferPool::default();
        let cancel = CancelToken::new();

        let a = crc32_reader(&mut content.as_slice(), &pool, &cancel).unwrap();
        let b = crc32_reader(&mut content.as_slice(), &pool, &cancel).unwrap();
        assert_eq!(a, b);

        let mut altered = content.clone();
        altered[0] ^= 0xFF;
        let c = crc32_reader(&mut altered.as_slice(), &pool, &cancel).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_digest_invariant_under_buffer_size() {
        let content = sample_content();
        let cancel = CancelToken::new();

        let baseline_pool = BufferPool::default();
        let crc_baseline =
            crc32_reader(&mut content.as_slice(), &baseline_pool, &cancel).unwrap();
        let xxh_baseline =
            xxh64_reader(&mut content.as_slice(), &baseline_pool, &cancel).unwrap();

        for buffer_size in [16usize, 1024, 4096, 1 << 20] {
            let pool = BufferPool::new(buffer_size);
            assert_eq!(
                crc32_reader(&mut content.as_slice(), &pool, &cancel).unwrap(),
                crc_baseline
            );
            assert_eq!(
                xxh64_reader(&mut content.as_slice(), &pool, &cancel).unwrap(),
                xxh_baseline
            );
        }
    }

    #[tokio::test]
    async fn test_async_matches_blocking() {
        let content = sample_content();
        let pool = BufferPool::default();
        let cancel = CancelToken::new();

        let crc_sync = crc32_reader(&mut content.as_slice(), &pool, &cancel).unwrap();
        let crc_async = crc32_reader_async(&mut content.as_slice(), &pool, &cancel)
            .await
            .unwrap();
        assert_eq!(crc_sync, crc_async);

        let xxh_sync = xxh64_reader(&mut content.as_slice(), &pool, &cancel).unwrap();
        let xxh_async = xxh64_reader_async(&mut content.as_slice(), &pool, &cancel)
            .await
            .unwrap();
        assert_eq!(xxh_sync, xxh_async);
    }

    #[test]
    fn test_empty_stream() {
        let pool = BufferPool::default();
        let cancel = CancelToken::new();
        let empty: &[u8] = &[];

        // CRC32 of the empty message is 0
        assert_eq!(crc32_reader(&mut &*empty, &pool, &cancel).unwrap(), 0);
        // XXH64 of the empty message with seed 0 is a fixed known value
        assert_eq!(
            xxh64_reader(&mut &*empty, &pool, &cancel).unwrap(),
            0xEF46_DB37_51D8_E999
        );
    }

    #[test]
    fn test_cancellation_aborts() {
        let content = sample_content();
        let pool = BufferPool::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            crc32_reader(&mut content.as_slice(), &pool, &cancel),
            Err(HashError::Cancelled)
        ));
        assert!(matches!(
            xxh64_reader(&mut content.as_slice(), &pool, &cancel),
            Err(HashError::Cancelled)
        ));

        // The scratch buffer still returned to the pool on the error path
        assert!(pool.idle_count() >= 1);
    }

    #[test]
    fn test_read_error_propagates() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "bad disk"))
            }
        }

        let pool = BufferPool::default();
        let cancel = CancelToken::new();
        let result = crc32_reader(&mut FailingReader, &pool, &cancel);
        assert!(matches!(result, Err(HashError::Io(_))));
        assert_eq!(pool.idle_count(), 1);
    }
}
