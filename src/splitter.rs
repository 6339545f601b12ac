//! # Time-Step Splitter
//!
//! Splits one monthly ERA5 NetCDF file into one file per 6-hourly timestep.
//!
//! A run proceeds in two phases:
//!
//! 1. **Preconditions** (fatal): the input file must be readable and the
//!    extraction capability must be available. The period itself is a
//!    [`YearMonth`], so it was validated when the job was built.
//! 2. **Extraction** (recoverable): every timestep index `1..=days * 4` is
//!    extracted to its own file. A failing index is logged and counted, and
//!    the run moves on.
//!
//! Extractions run on a bounded pool of tokio tasks. With the default of one
//! worker they happen strictly in index order.

use crate::error::{SplitError, SplitResult, TimestepError};
use crate::extract::TimestepExtractor;
use crate::output::{self, OutputNaming};
use crate::timestep::{Timestep, YearMonth};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Tunables for a split run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    /// Maximum number of extractions in flight
    pub workers: usize,
    /// Per-extraction time limit
    pub timeout: Option<Duration>,
    /// Extra attempts for a failing timestep
    pub retries: u32,
    /// Delete the input after a run without any failed timestep
    pub remove_input: bool,
    /// Check preconditions and report planned outputs without extracting
    pub dry_run: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions {
            workers: 1,
            timeout: None,
            retries: 0,
            remove_input: false,
            dry_run: false,
        }
    }
}

/// What to split and where the pieces go.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitJob {
    pub input: PathBuf,
    pub period: YearMonth,
    pub output_dir: PathBuf,
    pub naming: OutputNaming,
}

impl SplitJob {
    pub fn new(input: impl Into<PathBuf>, period: YearMonth, output_dir: impl Into<PathBuf>) -> Self {
        SplitJob {
            input: input.into(),
            period,
            output_dir: output_dir.into(),
            naming: OutputNaming::default(),
        }
    }

    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn output_path(&self, step: &Timestep) -> PathBuf {
        self.naming.output_path(&self.output_dir, self.period, step)
    }
}

/// How per-timestep failures affect the process exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Exit 0 whenever the run completes
    #[default]
    Lenient,
    /// Exit 2 when any timestep failed
    Strict,
}

impl FailurePolicy {
    pub fn from_flag(fail_on_error: bool) -> Self {
        if fail_on_error {
            FailurePolicy::Strict
        } else {
            FailurePolicy::Lenient
        }
    }

    /// Exit status for a completed run with `error_count` failures.
    pub fn exit_status(&self, error_count: usize) -> u8 {
        match self {
            FailurePolicy::Strict if error_count > 0 => 2,
            _ => 0,
        }
    }
}

/// Result of one timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestepOutcome {
    pub index: usize,
    pub day: u32,
    pub hour: u32,
    pub output: PathBuf,
    pub attempts: u32,
    /// Size of the produced file, present on success
    pub size_bytes: Option<u64>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<TimestepError>,
}

impl TimestepOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a split run.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    pub input: PathBuf,
    pub period: String,
    pub output_dir: PathBuf,
    pub extractor: String,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Files in the output directory matching the naming pattern for the period
    pub files_present: usize,
    pub bytes_written: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub input_removed: bool,
    pub dry_run: bool,
    /// Planned file names, filled only for dry runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<String>,
    /// Outcomes ordered by timestep index
    pub outcomes: Vec<TimestepOutcome>,
}

impl SplitReport {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.index)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.dry_run && self.error_count == 0 && self.success_count == self.total
    }
}

fn serialize_error<S: Serializer>(error: &Option<TimestepError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}

/// Drives an extractor over every timestep of a month.
pub struct Splitter {
    extractor: Arc<dyn TimestepExtractor>,
    options: SplitOptions,
    show_progress: bool,
}

impl Splitter {
    pub fn new(extractor: Arc<dyn TimestepExtractor>, options: SplitOptions) -> Self {
        Splitter {
            extractor,
            options,
            show_progress: false,
        }
    }

    /// Draws a progress bar on stderr while extracting.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn options(&self) -> &SplitOptions {
        &self.options
    }

    pub fn extractor(&self) -> &dyn TimestepExtractor {
        self.extractor.as_ref()
    }

    /// Checks the extraction capability, returning its resolved path.
    pub fn check_tool(&self) -> SplitResult<PathBuf> {
        let path = self.extractor.check_available()?;
        debug!("Using {} at {}", self.extractor.name(), path.display());
        Ok(path)
    }

    /// Runs the preconditions and then every extraction for `job`.
    ///
    /// # Errors
    ///
    /// Only precondition failures are returned. Per-timestep failures are
    /// reported in [`SplitReport::outcomes`] and counted in `error_count`.
    pub async fn split(&self, job: &SplitJob) -> SplitResult<SplitReport> {
        check_input(&job.input)?;
        self.check_tool()?;
        self.split_unchecked_tool(job).await
    }

    /// Same as [`Splitter::split`] but assumes the tool was already checked.
    pub(crate) async fn split_unchecked_tool(&self, job: &SplitJob) -> SplitResult<SplitReport> {
        check_input(&job.input)?;

        let started = Instant::now();
        let period = job.period;
        let total = period.total_timesteps();
        info!(
            "Splitting {} ({}, {} days) into {} timesteps",
            job.input.display(),
            period.label(),
            period.days(),
            total
        );

        if self.options.dry_run {
            let planned = job.naming.planned_files(period);
            info!(
                "Dry run: would write {} files to {}",
                planned.len(),
                job.output_dir.display()
            );
            return Ok(SplitReport {
                input: job.input.clone(),
                period: period.label(),
                output_dir: job.output_dir.clone(),
                extractor: self.extractor.name().to_string(),
                total,
                success_count: 0,
                error_count: 0,
                files_present: present_files(job),
                bytes_written: 0,
                elapsed: started.elapsed(),
                input_removed: false,
                dry_run: true,
                planned,
                outcomes: Vec::new(),
            });
        }

        output::ensure_output_dir(&job.output_dir)?;

        let outcomes = self.extract_all(job).await?;
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let error_count = outcomes.len() - success_count;
        let bytes_written = outcomes.iter().filter_map(|o| o.size_bytes).sum();

        let mut input_removed = false;
        if self.options.remove_input {
            if error_count == 0 {
                match output::remove_source_file(&job.input) {
                    Ok(freed) => {
                        info!(
                            "Removed input {} ({} freed)",
                            job.input.display(),
                            output::format_megabytes(freed)
                        );
                        input_removed = true;
                    }
                    Err(e) => warn!("Could not remove input {}: {}", job.input.display(), e),
                }
            } else {
                warn!(
                    "Keeping input {}: {} timesteps failed",
                    job.input.display(),
                    error_count
                );
            }
        }

        let report = SplitReport {
            input: job.input.clone(),
            period: period.label(),
            output_dir: job.output_dir.clone(),
            extractor: self.extractor.name().to_string(),
            total,
            success_count,
            error_count,
            files_present: present_files(job),
            bytes_written,
            elapsed: started.elapsed(),
            input_removed,
            dry_run: false,
            planned: Vec::new(),
            outcomes,
        };
        info!(
            "Finished {}: {} succeeded, {} failed in {:.2?}",
            period.label(),
            report.success_count,
            report.error_count,
            report.elapsed
        );
        Ok(report)
    }

    async fn extract_all(&self, job: &SplitJob) -> SplitResult<Vec<TimestepOutcome>> {
        let total = job.period.total_timesteps();
        let progress = self.progress_bar(total as u64);
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let failed = Arc::new(AtomicUsize::new(0));
        let input: Arc<Path> = Arc::from(job.input.as_path());

        let mut handles = Vec::with_capacity(total);
        for step in job.period.timesteps() {
            // acquiring before spawning keeps the single-worker case in index order
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SplitError::Io(io::Error::other(e)))?;

            let extractor = Arc::clone(&self.extractor);
            let input = Arc::clone(&input);
            let failed = Arc::clone(&failed);
            let progress = progress.clone();
            let output = job.output_path(&step);
            let options = self.options.clone();

            let handle = tokio::spawn(async move {
                let outcome =
                    extract_with_retries(extractor.as_ref(), &input, step, output, &options).await;
                if !outcome.is_success() {
                    let n = failed.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.set_message(format!("{} failed", n));
                }
                progress.inc(1);
                drop(permit);
                outcome
            });
            handles.push((step, job.output_path(&step), handle));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (step, output, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Worker for timestep {} panicked: {}", step.index, e);
                    failed.fetch_add(1, Ordering::Relaxed);
                    outcomes.push(TimestepOutcome {
                        index: step.index,
                        day: step.day,
                        hour: step.hour,
                        output,
                        attempts: 0,
                        size_bytes: None,
                        error: Some(TimestepError::Extraction {
                            index: step.index,
                            message: format!("worker task failed: {}", e),
                        }),
                    });
                }
            }
        }
        progress.finish_and_clear();

        debug!(
            "{} of {} timesteps failed",
            failed.load(Ordering::Relaxed),
            total
        );
        Ok(outcomes)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} timesteps {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// The input must be an existing, readable regular file.
pub fn check_input(input: &Path) -> SplitResult<()> {
    let readable = std::fs::metadata(input)
        .map(|m| m.is_file())
        .unwrap_or(false)
        && std::fs::File::open(input).is_ok();
    if readable {
        Ok(())
    } else {
        Err(SplitError::InputNotFound(input.to_path_buf()))
    }
}

fn present_files(job: &SplitJob) -> usize {
    match output::count_outputs(&job.output_dir, &job.naming, job.period) {
        Ok(n) => n,
        Err(e) => {
            warn!("Could not list {}: {}", job.output_dir.display(), e);
            0
        }
    }
}

async fn extract_with_retries(
    extractor: &dyn TimestepExtractor,
    input: &Path,
    step: Timestep,
    output: PathBuf,
    options: &SplitOptions,
) -> TimestepOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match extract_once(extractor, input, step.index, &output, options.timeout).await {
            Ok(size) => {
                info!(
                    "Created {} ({})",
                    output.display(),
                    output::format_megabytes(size)
                );
                return TimestepOutcome {
                    index: step.index,
                    day: step.day,
                    hour: step.hour,
                    output,
                    attempts,
                    size_bytes: Some(size),
                    error: None,
                };
            }
            Err(e) if attempts <= options.retries => {
                warn!(
                    "{} (attempt {} of {}), retrying",
                    e,
                    attempts,
                    options.retries + 1
                );
            }
            Err(e) => {
                error!("{}", e);
                return TimestepOutcome {
                    index: step.index,
                    day: step.day,
                    hour: step.hour,
                    output,
                    attempts,
                    size_bytes: None,
                    error: Some(e),
                };
            }
        }
    }
}

async fn extract_once(
    extractor: &dyn TimestepExtractor,
    input: &Path,
    index: usize,
    output: &Path,
    limit: Option<Duration>,
) -> Result<u64, TimestepError> {
    // a stale file from an earlier run must not pass verification
    discard_output(output).await;

    let result = run_and_verify(extractor, input, index, output, limit).await;
    if result.is_err() {
        // empty or partial files of a failed timestep are never left behind
        discard_output(output).await;
    }
    result
}

async fn run_and_verify(
    extractor: &dyn TimestepExtractor,
    input: &Path,
    index: usize,
    output: &Path,
    limit: Option<Duration>,
) -> Result<u64, TimestepError> {
    let call = extractor.extract(input, index, output);
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TimestepError::Timeout {
                    index,
                    limit_ms: limit.as_millis() as u64,
                });
            }
        },
        None => call.await?,
    }

    output::verified_size(output)
        .await
        .ok_or_else(|| TimestepError::OutputMissing {
            index,
            path: output.to_path_buf(),
        })
}

async fn discard_output(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await
        && e.kind() != io::ErrorKind::NotFound
    {
        debug!("Could not remove {}: {}", output.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_exit_status() {
        assert_eq!(FailurePolicy::Lenient.exit_status(0), 0);
        assert_eq!(FailurePolicy::Lenient.exit_status(5), 0);
        assert_eq!(FailurePolicy::Strict.exit_status(0), 0);
        assert_eq!(FailurePolicy::Strict.exit_status(1), 2);
        assert_eq!(FailurePolicy::from_flag(true), FailurePolicy::Strict);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Lenient);
    }

    #[test]
    fn test_default_options_are_sequential() {
        let options = SplitOptions::default();
        assert_eq!(options.workers, 1);
        assert_eq!(options.retries, 0);
        assert!(options.timeout.is_none());
        assert!(!options.remove_input);
    }

    #[test]
    fn test_check_input() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("era5_201802.nc");
        std::fs::write(&file, b"CDF").unwrap();

        assert!(check_input(&file).is_ok());
        assert!(matches!(
            check_input(&dir.path().join("missing.nc")),
            Err(SplitError::InputNotFound(_))
        ));
        // a directory is not a readable input file
        assert!(matches!(
            check_input(dir.path()),
            Err(SplitError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_job_output_path_uses_naming() {
        let feb = YearMonth::parse("2018", "02").unwrap();
        let job = SplitJob::new("era5_sl_201802.nc", feb, "temp")
            .with_naming(OutputNaming::with_suffix("sl").unwrap());
        let step = feb.timestep(5).unwrap();
        assert_eq!(
            job.output_path(&step),
            PathBuf::from("temp").join("era5_20180202_0000_sl.nc")
        );
    }
}
