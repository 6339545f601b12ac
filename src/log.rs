//! # Logging and Console Output
//!
//! Sets up `env_logger` for the binary and prints the human-facing banners
//! and summaries. Diagnostics go through the `log` facade; the banners are
//! plain stdout output so they can be silenced with `--quiet` independently
//! of the log level.

use crate::batch::BatchReport;
use crate::input::ExtractionSettings;
use crate::output::format_megabytes;
use crate::splitter::SplitReport;
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Structured formats for summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryFormat {
    Human,
    Json,
    Yaml,
}

/// Log level implied by the global flags.
pub fn level_for(verbose: bool, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Name of the log file for a run started now.
pub fn log_file_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("era5split_{}.log", stamp))
}

/// Initializes the global logger.
///
/// `RUST_LOG` takes precedence over the flag-derived level. With a
/// `log_dir`, records are written to a timestamped file there instead of
/// stderr, and the file path is returned.
pub fn init_logging(verbose: bool, quiet: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level_for(verbose, quiet).as_str()));

    let log_path = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = log_file_path(dir);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder.target(Target::Pipe(Box::new(file)));
            Some(path)
        }
        None => None,
    };

    builder.format_timestamp_secs();
    // a second initialization (e.g. from tests) keeps the first logger
    let _ = builder.try_init();
    Ok(log_path)
}

pub fn show_greeting(command: &str) {
    println!("=== ERA5 Time-Step Splitter ===");
    println!("Command: {}", command);
}

pub fn config_echo(settings: &ExtractionSettings) {
    println!("\nConfiguration:");
    println!("  Output directory: {}", settings.output_dir.display());
    match settings.naming.suffix() {
        Some(suffix) => println!("  Variant suffix: {}", suffix),
        None => println!("  Variant suffix: none"),
    }
    println!("  Workers: {}", settings.options.workers);
    match settings.options.timeout {
        Some(limit) => println!("  Timeout: {}s per timestep", limit.as_secs()),
        None => println!("  Timeout: none"),
    }
    println!("  Retries: {}", settings.options.retries);
    println!("  Remove input on success: {}", settings.options.remove_input);
    if settings.options.dry_run {
        println!("  Dry run: no files will be written");
    }
}

/// Prints a serializable summary as JSON or YAML.
pub fn print_structured<T: Serialize>(value: &T, format: SummaryFormat) -> Result<()> {
    match format {
        SummaryFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        SummaryFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
        SummaryFormat::Human => {}
    }
    Ok(())
}

pub fn show_split_summary(report: &SplitReport, format: SummaryFormat) -> Result<()> {
    if format != SummaryFormat::Human {
        return print_structured(report, format);
    }

    println!("\nSplit Summary ({}):", report.period);
    println!("  Input: {}", report.input.display());
    println!("  Total timesteps: {}", report.total);
    if report.dry_run {
        println!("  Planned files: {}", report.planned.len());
        if let (Some(first), Some(last)) = (report.planned.first(), report.planned.last()) {
            println!("    {} ... {}", first, last);
        }
    } else {
        println!("  Succeeded: {}", report.success_count);
        println!("  Failed: {}", report.error_count);
        println!("  Written: {}", format_megabytes(report.bytes_written));
        let failed = report.failed_indices();
        if !failed.is_empty() {
            let list: Vec<String> = failed.iter().map(|i| i.to_string()).collect();
            println!("  Failed timesteps: {}", list.join(", "));
        }
        if report.input_removed {
            println!("  Input removed: yes");
        }
    }
    println!(
        "  Files in {}: {}",
        report.output_dir.display(),
        report.files_present
    );
    Ok(())
}

pub fn show_batch_summary(report: &BatchReport, format: SummaryFormat) -> Result<()> {
    if format != SummaryFormat::Human {
        return print_structured(report, format);
    }

    println!("\nBatch Summary:");
    for month in &report.months {
        match (&month.report, &month.skipped) {
            (Some(r), _) if r.dry_run => {
                println!("  {}: {} planned", month.period, r.planned.len())
            }
            (Some(r), _) => println!(
                "  {}: {} succeeded, {} failed, {} files present",
                month.period, r.success_count, r.error_count, r.files_present
            ),
            (None, Some(reason)) => println!("  {}: skipped ({})", month.period, reason),
            (None, None) => println!("  {}: skipped", month.period),
        }
    }
    println!(
        "  Total: {} succeeded, {} failed, {} months skipped",
        report.success_count, report.error_count, report.months_skipped
    );
    Ok(())
}

pub fn show_farewell_with_timing(elapsed: Duration, failures: usize) {
    if failures == 0 {
        println!("\n=== Split completed successfully! ===");
    } else {
        println!("\n=== Split completed with {} failures ===", failures);
    }
    println!("Total time: {:.2?}", elapsed);
}
