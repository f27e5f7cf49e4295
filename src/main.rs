//! backup-indexer - Concurrent File-Tree Indexer
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use backup_indexer::config::{CliArgs, IndexerConfig, JobConfig};
use backup_indexer::engine::BackupEngine;
use backup_indexer::progress::{print_header, print_summary, ProgressReporter};
use backup_indexer::vfs::LocalFileSystem;
use backup_indexer::CancelToken;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = IndexerConfig::from_args(&args).context("Invalid configuration")?;
    let job = JobConfig {
        source_path: args.source.clone(),
        destination_path: args.destination.clone(),
        dry_run: args.dry_run,
        override_existing_lock: args.override_lock,
    };

    if config.show_progress {
        print_header(
            &job.source_path.display().to_string(),
            &job.destination_path.display().to_string(),
            config.worker_count,
        );
    }

    // Setup signal handler for graceful cancellation
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, cancelling scan...");
            cancel.cancel();
        })
        .context("Failed to set signal handler")?;
    }

    let engine = BackupEngine::new(config.clone());

    // Progress reporter polls the scan counters until the run finishes
    let progress_stop = Arc::new(AtomicBool::new(false));
    let progress_thread = if config.show_progress {
        let counters = engine.counters();
        let stop = Arc::clone(&progress_stop);
        let reporter = ProgressReporter::new();
        reporter.set_status("Indexing...");
        Some(std::thread::spawn(move || {
            let start = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                reporter.update(&counters.progress(start.elapsed()));
                std::thread::sleep(Duration::from_millis(200));
            }
            reporter.finish("Index complete");
        }))
    } else {
        None
    };

    // Run the backup index
    let fs = Arc::new(LocalFileSystem::new());
    let result = engine.run(&job, fs.clone(), fs, &cancel);

    progress_stop.store(true, Ordering::Relaxed);
    if let Some(handle) = progress_thread {
        let _ = handle.join();
    }

    let outcome = result.context("Backup index run failed")?;

    if config.show_progress {
        print_summary(&outcome.summary);
    }

    if outcome.summary.error_count > 0 {
        info!(
            errors = outcome.summary.error_count,
            "Run completed with per-file errors"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("backup_indexer=debug,warn")
    } else {
        EnvFilter::new("backup_indexer=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
