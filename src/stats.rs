//! Running statistics accumulator
//!
//! `RunningStats` maintains count, arithmetic mean, and (lazily) variance
//! over a growing sequence of samples without re-reading the whole sequence
//! on every query. The mean is updated incrementally on append; the
//! variance is recomputed on demand and cached until the next mutation.
//!
//! All operations are thread safe. A single mutex guards the sample store,
//! the running mean, and the variance cache for the duration of every
//! public method, so readers always observe a consistent mean/variance
//! pair. Call rates here are bounded by file I/O, not CPU.

use crate::error::StatsError;
use std::sync::Mutex;

/// Default initial capacity when none is suggested
const DEFAULT_CAPACITY: usize = 16;

/// Batch size at and above which summation switches to the unrolled
/// multi-lane path. Approximate threshold based on benchmarking.
const LANE_SUM_THRESHOLD: usize = 128;

/// Number of independent accumulator lanes. Eight f64 lanes fill two AVX2
/// registers; independent accumulators keep the loop vectorizable.
const SUM_LANES: usize = 8;

#[derive(Debug)]
struct StatsInner {
    /// Append-only sample store. Owning the backing buffer directly keeps
    /// the summation loops contiguous.
    samples: Vec<f64>,

    /// Running arithmetic mean, updated on every append
    mean: f64,

    /// Cached variance, invalidated on every mutation
    cached_variance: Option<f64>,
}

/// Thread-safe running statistics over a dynamically growing sample set.
///
/// The set can only be appended to or cleared. Non-finite samples are
/// rejected before any mutation, so a failed batch append leaves the set
/// exactly as it was.
#[derive(Debug)]
pub struct RunningStats {
    inner: Mutex<StatsInner>,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Create an accumulator with the default initial capacity.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                samples: Vec::with_capacity(DEFAULT_CAPACITY),
                mean: 0.0,
                cached_variance: None,
            }),
        }
    }

    /// Create an accumulator with a suggested initial capacity, to avoid
    /// reallocation when the expected sample count is known up front.
    pub fn with_capacity(capacity: usize) -> Result<Self, StatsError> {
        if capacity == 0 {
            return Err(StatsError::InvalidCapacity);
        }

        Ok(Self {
            inner: Mutex::new(StatsInner {
                samples: Vec::with_capacity(capacity),
                mean: 0.0,
                cached_variance: None,
            }),
        })
    }

    /// Remove all samples and reset mean and variance to zero.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.samples.clear();
        inner.mean = 0.0;
        inner.cached_variance = None;
    }

    /// Append a single sample. The mean is updated in O(1).
    ///
    /// Fails with `StatsError::NonFiniteSample` if the sample is NaN or
    /// infinite; the set is untouched in that case.
    pub fn add(&self, sample: f64) -> Result<(), StatsError> {
        if !sample.is_finite() {
            return Err(StatsError::NonFiniteSample(sample));
        }

        let mut inner = self.lock();
        inner.samples.push(sample);
        let n = inner.samples.len() as f64;
        inner.mean = (sample + inner.mean * (n - 1.0)) / n;
        inner.cached_variance = None;
        Ok(())
    }

    /// Append a batch of samples.
    ///
    /// The entire batch is validated before anything is stored, so a batch
    /// containing a NaN or infinity leaves count, mean, and variance
    /// exactly as they were. The mean is folded in with a single aggregated
    /// sum rather than per-element updates.
    pub fn add_slice(&self, values: &[f64]) -> Result<(), StatsError> {
        for &v in values {
            if !v.is_finite() {
                return Err(StatsError::NonFiniteSample(v));
            }
        }

        if values.is_empty() {
            return Ok(());
        }

        let mut inner = self.lock();
        let old_count = inner.samples.len() as f64;
        inner.samples.extend_from_slice(values);
        let new_count = inner.samples.len() as f64;

        let batch_sum = sum(values);
        inner.mean = (batch_sum + inner.mean * old_count) / new_count;
        inner.cached_variance = None;
        Ok(())
    }

    /// Append a bounds-checked sub-range of a sample slice.
    ///
    /// Check order mirrors the single-sample and batch contracts:
    /// an out-of-bounds offset fails even when `count` is zero, a zero
    /// `count` with a valid offset is a successful no-op, and a range
    /// running past the end of the slice fails before any mutation.
    /// Negative offsets and counts are unrepresentable with `usize`.
    pub fn add_range(&self, values: &[f64], offset: usize, count: usize) -> Result<(), StatsError> {
        if offset >= values.len() {
            return Err(StatsError::OffsetOutOfBounds {
                offset,
                len: values.len(),
            });
        }

        if count == 0 {
            return Ok(());
        }

        if offset + count > values.len() {
            return Err(StatsError::RangeOutOfBounds {
                offset,
                count,
                len: values.len(),
            });
        }

        self.add_slice(&values[offset..offset + count])
    }

    /// Number of samples currently in the set
    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Current arithmetic mean. An empty set reads 0.
    pub fn mean(&self) -> f64 {
        self.lock().mean
    }

    /// Population variance of the set. An empty set reads 0.
    ///
    /// Recomputed over all stored samples only when the cache is stale,
    /// then cached until the next mutation.
    pub fn variance(&self) -> f64 {
        let mut inner = self.lock();
        if inner.samples.is_empty() {
            return 0.0;
        }

        if let Some(cached) = inner.cached_variance {
            return cached;
        }

        let mean = inner.mean;
        let sum_sq_delta = sum_squared_deltas(&inner.samples, mean);
        let variance = sum_sq_delta / inner.samples.len() as f64;
        inner.cached_variance = Some(variance);
        variance
    }

    /// Standard deviation of the set. An empty set reads 0.
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatsInner> {
        self.inner.lock().expect("stats mutex poisoned")
    }
}

/// Sum a slice, switching to the unrolled lane path for large inputs.
fn sum(values: &[f64]) -> f64 {
    if values.len() >= LANE_SUM_THRESHOLD {
        lane_sum(values)
    } else {
        values.iter().sum()
    }
}

/// Sum of squared deltas from the mean, same lane strategy as `sum`.
fn sum_squared_deltas(values: &[f64], mean: f64) -> f64 {
    if values.len() >= LANE_SUM_THRESHOLD {
        lane_sum_squared_deltas(values, mean)
    } else {
        values.iter().map(|v| (v - mean) * (v - mean)).sum()
    }
}

fn lane_sum(values: &[f64]) -> f64 {
    let mut lanes = [0.0f64; SUM_LANES];
    let chunks = values.chunks_exact(SUM_LANES);
    let remainder = chunks.remainder();

    for chunk in chunks {
        for (lane, &v) in lanes.iter_mut().zip(chunk) {
            *lane += v;
        }
    }

    lanes.iter().sum::<f64>() + remainder.iter().sum::<f64>()
}

fn lane_sum_squared_deltas(values: &[f64], mean: f64) -> f64 {
    let mut lanes = [0.0f64; SUM_LANES];
    let chunks = values.chunks_exact(SUM_LANES);
    let remainder = chunks.remainder();

    for chunk in chunks {
        for (lane, &v) in lanes.iter_mut().zip(chunk) {
            let delta = v - mean;
            *lane += delta * delta;
        }
    }

    lanes.iter().sum::<f64>()
        + remainder
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn naive_variance(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mean = naive_mean(values);
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
    }

    /// Deterministic pseudo-random sequence (xorshift), so test values are
    /// reproducible without a rand dependency.
    struct XorShift(u64);

    impl XorShift {
        fn next_f64(&mut self) -> f64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            // Scale into roughly [-1000, 1000]
            (x % 2_000_000) as f64 / 1000.0 - 1000.0
        }
    }

    #[test]
    fn test_constructor_capacity() {
        assert!(RunningStats::with_capacity(1).is_ok());
        assert!(RunningStats::with_capacity(1000).is_ok());
        assert_eq!(
            RunningStats::with_capacity(0).err(),
            Some(StatsError::InvalidCapacity)
        );
    }

    #[test]
    fn test_empty_set_reads_zero() {
        let stats = RunningStats::new();
        assert_eq!(stats.sample_count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_clear_resets_everything() {
        let stats = RunningStats::new();
        for v in [5.0, 1.0, 7.0, 6.0] {
            stats.add(v).unwrap();
        }
        assert_ne!(stats.mean(), 0.0);
        assert_ne!(stats.variance(), 0.0);
        assert_ne!(stats.sample_count(), 0);

        stats.clear();
        assert_eq!(stats.sample_count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_add_rejects_non_finite() {
        let stats = RunningStats::new();
        assert!(stats.add(f64::NAN).is_err());
        assert!(stats.add(f64::INFINITY).is_err());
        assert!(stats.add(f64::NEG_INFINITY).is_err());
        assert_eq!(stats.sample_count(), 0);
    }

    #[test]
    fn test_incremental_matches_naive_recomputation() {
        let stats = RunningStats::new();
        let mut rng = XorShift(8983411);
        let mut shadow = Vec::new();

        for _ in 0..1000 {
            let v = rng.next_f64();
            stats.add(v).unwrap();
            shadow.push(v);

            assert_eq!(stats.sample_count(), shadow.len());
            let expected_mean = naive_mean(&shadow);
            let expected_var = naive_variance(&shadow);
            assert!((stats.mean() - expected_mean).abs() <= 1e-5 * expected_mean.abs().max(1.0));
            assert!((stats.variance() - expected_var).abs() <= 1e-2 * expected_var.abs().max(1.0));
            assert!(
                (stats.stddev() - expected_var.sqrt()).abs()
                    <= 1e-5 * expected_var.sqrt().max(1.0)
            );
        }
    }

    #[test]
    fn test_add_slice_matches_naive_recomputation() {
        let stats = RunningStats::new();
        let mut rng = XorShift(71);
        let mut shadow = Vec::new();

        // Batch sizes straddling the lane threshold
        for batch_size in [1usize, 3, 64, 127, 128, 129, 500] {
            let batch: Vec<f64> = (0..batch_size).map(|_| rng.next_f64()).collect();
            stats.add_slice(&batch).unwrap();
            shadow.extend_from_slice(&batch);

            let expected_mean = naive_mean(&shadow);
            let expected_var = naive_variance(&shadow);
            assert!((stats.mean() - expected_mean).abs() <= 1e-5 * expected_mean.abs().max(1.0));
            assert!((stats.variance() - expected_var).abs() <= 1e-2 * expected_var.abs().max(1.0));
        }
    }

    #[test]
    fn test_rejected_batch_leaves_state_untouched() {
        let stats = RunningStats::new();
        stats.add_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();

        let count_before = stats.sample_count();
        let mean_before = stats.mean();
        let var_before = stats.variance();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = stats.add_slice(&[5.0, 6.0, bad, 7.0]);
            assert!(matches!(result, Err(StatsError::NonFiniteSample(_))));
            assert_eq!(stats.sample_count(), count_before);
            assert_eq!(stats.mean(), mean_before);
            assert_eq!(stats.variance(), var_before);
        }
    }

    #[test]
    fn test_add_range_bounds() {
        let stats = RunningStats::new();
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];

        // count = 0 with valid offset is a successful no-op
        stats.add_range(&values, 2, 0).unwrap();
        assert_eq!(stats.sample_count(), 0);

        // offset out of bounds fails even with count = 0
        assert!(matches!(
            stats.add_range(&values, 5, 0),
            Err(StatsError::OffsetOutOfBounds { offset: 5, len: 5 })
        ));
        assert!(matches!(
            stats.add_range(&[], 0, 0),
            Err(StatsError::OffsetOutOfBounds { .. })
        ));

        // offset at the last valid index with count exceeding the remainder
        assert!(matches!(
            stats.add_range(&values, 4, 2),
            Err(StatsError::RangeOutOfBounds {
                offset: 4,
                count: 2,
                len: 5
            })
        ));

        // valid sub-range appends exactly that window
        stats.add_range(&values, 1, 3).unwrap();
        assert_eq!(stats.sample_count(), 3);
        assert!((stats.mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_range_rejects_non_finite_without_mutation() {
        let stats = RunningStats::new();
        stats.add(10.0).unwrap();
        let mean_before = stats.mean();

        let values = [1.0, f64::NAN, 3.0];
        assert!(stats.add_range(&values, 0, 3).is_err());
        assert_eq!(stats.sample_count(), 1);
        assert_eq!(stats.mean(), mean_before);
    }

    #[test]
    fn test_lane_sum_matches_iter_sum() {
        let mut rng = XorShift(42);
        for len in [128usize, 129, 1000, 1024] {
            let values: Vec<f64> = (0..len).map(|_| rng.next_f64()).collect();
            let expected: f64 = values.iter().sum();
            let lanes = lane_sum(&values);
            assert!((lanes - expected).abs() <= 1e-6 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn test_variance_cache_survives_reads() {
        let stats = RunningStats::new();
        stats.add_slice(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();

        // Classic textbook set: variance 4, stddev 2
        assert!((stats.variance() - 4.0).abs() < 1e-12);
        assert!((stats.variance() - 4.0).abs() < 1e-12);
        assert!((stats.stddev() - 2.0).abs() < 1e-12);

        // Mutation invalidates the cache
        stats.add(100.0).unwrap();
        assert!(stats.variance() > 4.0);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;

        let stats = Arc::new(RunningStats::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    stats.add((t * 250 + i) as f64).unwrap();
                    // Interleaved reads must always see a consistent pair
                    let v = stats.variance();
                    let m = stats.mean();
                    assert!(v >= 0.0);
                    assert!(m.is_finite());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.sample_count(), 1000);
        let expected: Vec<f64> = (0..1000).map(|v| v as f64).collect();
        let expected_mean = expected.iter().sum::<f64>() / 1000.0;
        assert!((stats.mean() - expected_mean).abs() < 1e-6);
    }
}
