//! # era5split
//!
//! A Rust library and command-line tool that splits monthly ERA5 reanalysis
//! NetCDF files into one file per 6-hourly timestep by driving the CDO
//! `seltimestep` operator.
//!
//! ## Features
//!
//! - **Calendar-aware**: the number of timesteps follows the Gregorian
//!   calendar (`days_in_month * 4`)
//! - **Deterministic names**: `era5_YYYYMMDD_HH00.nc`, optionally with a
//!   variant suffix such as `_sl`
//! - **Failure isolation**: a failing timestep is counted and skipped
//! - **Pluggable extraction**: anything implementing
//!   [`extract::TimestepExtractor`] can stand in for CDO
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use era5split::input::{ExtractionSettings, resolve_period};
//! use era5split::output::OutputNaming;
//! use era5split::process_split_job;
//! use era5split::splitter::{FailurePolicy, SplitOptions};
//! use std::path::{Path, PathBuf};
//!
//! # async fn run() -> Result<(), era5split::error::SplitError> {
//! let input = Path::new("era5_201802.nc");
//! let period = resolve_period(None, None, input)?;
//! let settings = ExtractionSettings {
//!     output_dir: PathBuf::from("temp"),
//!     naming: OutputNaming::default(),
//!     options: SplitOptions::default(),
//!     policy: FailurePolicy::Lenient,
//!     cdo: None,
//! };
//!
//! let report = process_split_job(input, period, &settings, false).await?;
//! println!("{} of {} timesteps written", report.success_count, report.total);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cli;
pub mod error;
pub mod extract;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod splitter;
pub mod timestep;


use crate::batch::{BatchJob, BatchReport, run_batch};
use crate::error::SplitResult;
use crate::input::ExtractionSettings;
use crate::splitter::{SplitJob, SplitReport, Splitter};
use crate::timestep::{MonthRange, YearMonth};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Splits one monthly file with the CDO backend described by `settings`.
///
/// Preconditions are checked before any extraction: the input must be
/// readable, then CDO must be available.
///
/// # Errors
///
/// Returns a [`error::SplitError`] only when a precondition fails or the
/// output directory cannot be created. Per-timestep failures are part of the
/// returned report.
pub async fn process_split_job(
    input: &Path,
    period: YearMonth,
    settings: &ExtractionSettings,
    show_progress: bool,
) -> SplitResult<SplitReport> {
    let splitter = Splitter::new(Arc::new(settings.extractor()), settings.options.clone())
        .with_progress(show_progress);
    let job = SplitJob::new(input, period, settings.output_dir.clone())
        .with_naming(settings.naming.clone());
    splitter.split(&job).await
}

/// Splits every monthly file of `range` found in `input_dir`.
pub async fn process_batch_job(
    input_dir: PathBuf,
    range: MonthRange,
    input_prefix: String,
    settings: &ExtractionSettings,
    show_progress: bool,
) -> SplitResult<BatchReport> {
    let splitter = Splitter::new(Arc::new(settings.extractor()), settings.options.clone())
        .with_progress(show_progress);
    let job = BatchJob {
        input_dir,
        range,
        input_prefix,
        output_dir: settings.output_dir.clone(),
        naming: settings.naming.clone(),
    };
    run_batch(&splitter, &job).await
}
