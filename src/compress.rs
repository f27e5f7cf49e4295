//! Per-file-type compressibility tracking
//!
//! The classifier answers one question for the backup pipeline: is a file
//! of this type worth compressing? Verdicts come from two tables keyed by
//! file extension (ASCII case-insensitive):
//!
//! - *fixed* entries, seeded once at startup for well-known formats, which
//!   never change; and
//! - *dynamic* entries, each backed by a [`RunningStats`] of observed
//!   compression ratios, which grow for the life of the classifier.
//!
//! Dynamic verdicts use a confidence band of mean ± k·stddev against a
//! fixed ratio threshold. This is a heuristic decision boundary, not a
//! formal hypothesis test; the threshold, band width, and minimum sample
//! count are policy constants exposed at construction.

use crate::stats::RunningStats;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Whether a file type is worth compressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compressibility {
    /// High confidence the type compresses below the threshold
    Suitable,
    /// High confidence it does not
    Unsuitable,
    /// Not enough evidence either way
    Unknown,
}

impl std::fmt::Display for Compressibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compressibility::Suitable => write!(f, "suitable"),
            Compressibility::Unsuitable => write!(f, "unsuitable"),
            Compressibility::Unknown => write!(f, "unknown"),
        }
    }
}

/// Decision policy for dynamic entries.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierPolicy {
    /// Compression ratio below which a type is worth compressing
    pub ratio_threshold: f64,

    /// Width of the confidence band, in standard deviations
    pub certainty_stddevs: f64,

    /// Minimum observations before a dynamic entry renders a verdict
    pub min_sample_count: usize,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.85,
            certainty_stddevs: 1.0,
            min_sample_count: 50,
        }
    }
}

/// Tracks compression-ratio statistics per file extension and classifies
/// extensions as suitable or unsuitable for compression.
///
/// Shared across scan workers: the maps are mutex-guarded, and each dynamic
/// entry is an `Arc<RunningStats>` so observations append outside the map
/// lock.
pub struct CompressibilityClassifier {
    policy: ClassifierPolicy,
    fixed: Mutex<HashMap<String, Compressibility>>,
    dynamic: Mutex<HashMap<String, Arc<RunningStats>>>,
}

impl Default for CompressibilityClassifier {
    fn default() -> Self {
        Self::new(ClassifierPolicy::default())
    }
}

impl CompressibilityClassifier {
    /// Create an empty classifier with the given decision policy
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self {
            policy,
            fixed: Mutex::new(HashMap::new()),
            dynamic: Mutex::new(HashMap::new()),
        }
    }

    /// Set or overwrite a fixed verdict for an extension. Fixed verdicts
    /// always win over dynamic statistics.
    pub fn seed_fixed(&self, extension: &str, verdict: Compressibility) {
        self.fixed
            .lock()
            .expect("fixed table mutex poisoned")
            .insert(normalize(extension), verdict);
    }

    /// Seed fixed verdicts for common file formats: plain-text formats
    /// compress well; already-compressed image, archive, and media
    /// containers do not.
    pub fn seed_common_formats(&self) {
        const SUITABLE: &[&str] = &[
            "txt", "ini", "xml", "json", "css", "html", "htm", "js", "yml", "log", "tsv", "csv",
        ];
        const UNSUITABLE: &[&str] = &[
            // Images
            "jpg", "jpeg", "jpe", "gif", "png", "webp", "heic", "dng", "jfif",
            // Archives
            "zip", "rar", "7z", "gz", "bzip", "bz2", "mobi", "epub", "azw3", "cbz", "cbr", "jar",
            "zst",
            // Media containers
            "mpg", "mpeg", "mp3", "mp4", "m4a", "mkv", "ogg", "opus", "webm", "flac", "aac",
            "avi", "mov", "wav", "wmv", "wma", "avif",
        ];

        for ext in SUITABLE {
            self.seed_fixed(ext, Compressibility::Suitable);
        }
        for ext in UNSUITABLE {
            self.seed_fixed(ext, Compressibility::Unsuitable);
        }
    }

    /// Record an observed compression ratio for an extension, creating its
    /// dynamic entry on first sight.
    ///
    /// Non-finite ratios are silently dropped; the probe never produces
    /// them from real input.
    pub fn observe(&self, extension: &str, ratio: f64) {
        let key = normalize(extension);
        let stats = {
            let mut dynamic = self.dynamic.lock().expect("dynamic table mutex poisoned");
            Arc::clone(dynamic.entry(key.clone()).or_default())
        };

        if stats.add(ratio).is_ok() {
            debug!(
                extension = %key,
                mean = format_args!("{:.4}", stats.mean()),
                stddev = format_args!("{:.4}", stats.stddev()),
                "Compression ratio observed"
            );
        }
    }

    /// Classify an extension. Fixed verdicts are returned unconditionally;
    /// dynamic entries apply the confidence-band rule; unseen extensions
    /// are `Unknown`.
    pub fn classify(&self, extension: &str) -> Compressibility {
        let key = normalize(extension);

        if let Some(verdict) = self
            .fixed
            .lock()
            .expect("fixed table mutex poisoned")
            .get(&key)
        {
            return *verdict;
        }

        let stats = {
            let dynamic = self.dynamic.lock().expect("dynamic table mutex poisoned");
            dynamic.get(&key).map(Arc::clone)
        };

        match stats {
            Some(stats) => self.suitability(&stats),
            None => Compressibility::Unknown,
        }
    }

    /// Dump the per-extension state at debug level. Intended for the end
    /// of a run.
    pub fn log_summary(&self) {
        debug!("Final compressibility statistics:");
        for (ext, verdict) in self.fixed.lock().expect("fixed table mutex poisoned").iter() {
            debug!(extension = %ext, verdict = %verdict, "fixed");
        }

        let dynamic: Vec<(String, Arc<RunningStats>)> = {
            let table = self.dynamic.lock().expect("dynamic table mutex poisoned");
            table.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        for (ext, stats) in dynamic {
            debug!(
                extension = %ext,
                mean = format_args!("{:.4}", stats.mean()),
                stddev = format_args!("{:.4}", stats.stddev()),
                samples = stats.sample_count(),
                verdict = %self.suitability(&stats),
                "dynamic"
            );
        }
    }

    /// Apply the confidence-band rule to a dynamic entry.
    fn suitability(&self, stats: &RunningStats) -> Compressibility {
        if stats.sample_count() < self.policy.min_sample_count {
            return Compressibility::Unknown;
        }

        let band = stats.stddev() * self.policy.certainty_stddevs;
        let mean = stats.mean();
        if mean + band < self.policy.ratio_threshold {
            Compressibility::Suitable
        } else if mean - band > self.policy.ratio_threshold {
            Compressibility::Unsuitable
        } else {
            Compressibility::Unknown
        }
    }
}

/// Extensions are matched case-insensitively, with or without a leading dot.
fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// Default cap on how much of a file the probe reads
pub const DEFAULT_PROBE_PREFIX_CAP: u64 = 10 * 1024 * 1024;

/// Fast compression level: the probe measures, it does not archive
const PROBE_COMPRESSION_LEVEL: i32 = 1;

/// Measures how well a byte stream compresses by running a bounded prefix
/// through a zstd encoder into a counting sink.
#[derive(Debug, Clone, Copy)]
pub struct CompressionProbe {
    /// Maximum number of bytes read from the input
    prefix_cap: u64,
}

impl Default for CompressionProbe {
    fn default() -> Self {
        Self {
            prefix_cap: DEFAULT_PROBE_PREFIX_CAP,
        }
    }
}

impl CompressionProbe {
    /// Create a probe reading at most `prefix_cap` bytes per file
    pub fn new(prefix_cap: u64) -> Self {
        Self { prefix_cap }
    }

    /// Compress up to the prefix cap from `reader` and return the observed
    /// ratio (compressed size / input size), clamped to at most 1.0.
    /// Returns `None` for empty input, which carries no evidence.
    pub fn probe(&self, reader: &mut dyn Read) -> std::io::Result<Option<f64>> {
        let mut counter = CountingSink::default();
        let mut bounded = reader.take(self.prefix_cap);

        let mut encoder = zstd::stream::Encoder::new(&mut counter, PROBE_COMPRESSION_LEVEL)?;
        let bytes_in = std::io::copy(&mut bounded, &mut encoder)?;
        encoder.finish()?;

        if bytes_in == 0 {
            return Ok(None);
        }

        let ratio = counter.written as f64 / bytes_in as f64;
        Ok(Some(ratio.min(1.0)))
    }
}

/// Write sink that discards data and counts bytes
#[derive(Debug, Default)]
struct CountingSink {
    written: u64,
}

impl Write for CountingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
