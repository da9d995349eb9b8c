//! mirror-agent - Scheduled local backup agent.
//!
//! Loads the backup configuration, runs a pass at startup and then one pass
//! every `timeBetweenBackups` hours, reporting progress to stderr.

mod logger;

use chrono::Local;
use clap::Parser;
use mirror_engine::{
    load_or_create_config, run_pass, ChecksumAlgorithm, ConsoleNotifier, EngineError,
    EntryRecord, EntryState, Notifier, PassOptions, PassReport, ProgressCallback, Scheduler,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// mirror-agent - Mirror a directory tree into a backup directory on a schedule
#[derive(Parser, Debug)]
#[command(name = "mirror-agent")]
#[command(version)]
#[command(about = "Mirror a directory tree into a backup directory on a schedule")]
struct Args {
    /// Configuration file (created with placeholders if missing)
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Checksum algorithm for change detection: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "md5")]
    hash: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Print every entry as it is processed
    #[arg(long)]
    verbose: bool,

    /// Do not copy source modification times onto backup files
    #[arg(long)]
    no_preserve_mtime: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0} entries failed to back up")]
    PartialFailure(usize),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(EngineError::ConfigMissing { .. }) => 1,
            CliError::PartialFailure(_) => 3,
            _ => 2,
        }
    }
}

/// Console implementation of ProgressCallback
struct CliProgress {
    verbose: bool,
    start_time: Instant,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn entry_status(record: &EntryRecord) -> String {
        match (record.state, record.action) {
            (EntryState::Failed, _) => "Failed".to_string(),
            (_, Some(action)) => action.to_string(),
            (_, None) => "Unknown".to_string(),
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_pass_started(&self, report: &PassReport) {
        eprintln!(
            "Backup pass started at {}",
            report.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        eprintln!("  Source: {}", report.source_root.display());
        eprintln!("  Backup: {}", report.backup_root.display());
    }

    fn on_entry_completed(&self, _report: &PassReport, entry_index: usize, record: &EntryRecord) {
        if self.verbose {
            eprintln!(
                "[{:5}] {}: {}",
                entry_index,
                Self::entry_status(record),
                record.source_path.display()
            );
        }
    }

    fn on_pass_completed(&self, report: &PassReport) {
        let elapsed = report
            .duration()
            .and_then(|d| d.to_std().ok())
            .unwrap_or_else(|| self.start_time.elapsed());

        eprintln!("Backup pass complete!");
        eprintln!(
            "Summary: {} new, {} changed, {} unchanged, {} directories created, {} failed",
            report.files_copied_new,
            report.files_copied_changed,
            report.files_unchanged,
            report.directories_created,
            report.failed_count()
        );
        if report.comparison_errors > 0 {
            eprintln!(
                "Comparison errors: {} (files recopied)",
                report.comparison_errors
            );
        }
        eprintln!("Bytes copied: {}", Self::format_bytes(report.bytes_copied));
        eprintln!("Elapsed: {}", Self::format_duration(elapsed));

        if !report.is_clean() {
            eprintln!();
            eprintln!("Failed entries:");
            for failure in &report.failures {
                eprintln!("  {}: {}", failure.path.display(), failure.message);
            }
        }
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = logger::init(&args.log_level) {
        eprintln!("Error: failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let exit_code = match run_cli(&args, &ConsoleNotifier, |interval| {
        std::thread::sleep(interval);
        true
    }) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli<S>(args: &Args, notifier: &dyn Notifier, sleep: S) -> Result<(), CliError>
where
    S: FnMut(Duration) -> bool,
{
    let checksum_algorithm = args
        .hash
        .parse::<ChecksumAlgorithm>()
        .map_err(CliError::InvalidArgument)?;
    let options = PassOptions {
        checksum_algorithm,
        preserve_mtime: !args.no_preserve_mtime,
    };

    let config = load_or_create_config(&args.config, notifier)?;
    config.validate()?;

    let progress = CliProgress::new(args.verbose);

    if args.once {
        let report = run_pass(&config, &options, Some(&progress))?;
        return if report.is_clean() {
            Ok(())
        } else {
            Err(CliError::PartialFailure(report.failed_count()))
        };
    }

    let scheduler = Scheduler::new(&args.config, options).with_progress(&progress);
    let passes = scheduler.run(config, sleep)?;
    tracing::info!(passes, "scheduler stopped");
    Ok(())
}
