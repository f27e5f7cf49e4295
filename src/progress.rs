//! Progress reporting for the indexer
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::engine::RunSummary;
use crate::scanner::ScanProgress;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays scan status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScanProgress) {
        let msg = format!(
            "Dirs: {}/{} | Files: {} | Size: {} | Rate: {:.0}/s | Errors: {}",
            format_number(progress.finished),
            format_number(progress.queued),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.files_per_second(),
            progress.errors,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, msg: &str) {
        self.bar.finish_with_message(msg.to_string());
    }
}

/// Print the run header
pub fn print_header(source: &str, destination: &str, workers: usize) {
    use console::style;

    println!("{}", style("backup-indexer").bold());
    println!("  Source:      {}", style(source).cyan());
    println!("  Destination: {}", style(destination).cyan());
    println!("  Workers:     {}", workers);
    println!();
}

/// Print the final summary
pub fn print_summary(summary: &RunSummary) {
    use console::style;

    println!();
    println!("{}", style("Run complete").bold().green());
    if summary.dry_run {
        println!("  {}", style("(dry run)").yellow());
    }
    println!("  Run id:      {}", summary.run_id);
    println!("  Directories: {}", format_number(summary.directories));
    println!("  Files:       {}", format_number(summary.files_indexed));
    println!(
        "  Indexed:     {}",
        format_size(summary.bytes_indexed, BINARY)
    );
    println!(
        "  Throughput:  {}/s",
        format_size(summary.throughput_bytes_per_sec() as u64, BINARY)
    );
    println!("  Elapsed:     {:.2}s", summary.duration.as_secs_f64());
    if summary.skipped > 0 {
        println!("  Skipped:     {}", format_number(summary.skipped));
    }
    if summary.error_count > 0 {
        println!(
            "  {}",
            style(format!("Errors:      {}", summary.error_count)).red()
        );
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_progress_rate() {
        let progress = ScanProgress {
            queued: 10,
            finished: 8,
            files: 1000,
            bytes: 1024 * 1024,
            errors: 2,
            elapsed: Duration::from_secs(10),
        };
        assert!((progress.files_per_second() - 100.0).abs() < 0.1);
    }
}
