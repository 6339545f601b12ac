//! # Batch Splitting
//!
//! Splits every monthly file of an inclusive month range found in one input
//! directory. Each month is an independent [`SplitJob`]; a month whose input
//! is missing is recorded and skipped, while an unavailable extraction tool
//! stops the batch before the first month.

use crate::error::SplitResult;
use crate::input::monthly_input_path;
use crate::output::OutputNaming;
use crate::splitter::{SplitJob, SplitReport, Splitter};
use crate::timestep::MonthRange;
use log::{info, warn};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Default file name prefix of monthly inputs (`era5_201802.nc`)
pub const DEFAULT_INPUT_PREFIX: &str = "era5_";

#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub input_dir: PathBuf,
    pub range: MonthRange,
    pub input_prefix: String,
    pub output_dir: PathBuf,
    pub naming: OutputNaming,
}

impl BatchJob {
    /// The split job for each month of the range, in chronological order.
    pub fn month_jobs(&self) -> Vec<SplitJob> {
        self.range
            .iter()
            .map(|period| {
                let input = monthly_input_path(&self.input_dir, &self.input_prefix, period);
                SplitJob::new(input, period, self.output_dir.clone()).with_naming(self.naming.clone())
            })
            .collect()
    }
}

/// Result for one month of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct MonthResult {
    pub period: String,
    pub input: PathBuf,
    /// Present when the month was split
    pub report: Option<SplitReport>,
    /// Why the month was skipped
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub months: Vec<MonthResult>,
    pub success_count: usize,
    pub error_count: usize,
    pub months_skipped: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl BatchReport {
    /// Failures counted against the failure policy: failed timesteps plus
    /// skipped months.
    pub fn failures(&self) -> usize {
        self.error_count + self.months_skipped
    }
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}

/// Runs `splitter` over every month of `job`.
///
/// # Errors
///
/// Only an unavailable extraction tool is fatal. Per-month precondition
/// failures are logged and recorded in [`MonthResult::skipped`].
pub async fn run_batch(splitter: &Splitter, job: &BatchJob) -> SplitResult<BatchReport> {
    splitter.check_tool()?;

    let started = Instant::now();
    info!(
        "Batch over {} months ({} to {}) from {}",
        job.range.len(),
        job.range.start().label(),
        job.range.end().label(),
        job.input_dir.display()
    );

    let mut months = Vec::with_capacity(job.range.len());
    for month_job in job.month_jobs() {
        let period = month_job.period.label();
        match splitter.split_unchecked_tool(&month_job).await {
            Ok(report) => months.push(MonthResult {
                period,
                input: month_job.input,
                report: Some(report),
                skipped: None,
            }),
            Err(e) => {
                warn!("Skipping {}: {}", period, e);
                months.push(MonthResult {
                    period,
                    input: month_job.input,
                    report: None,
                    skipped: Some(e.to_string()),
                });
            }
        }
    }

    let reports = months.iter().filter_map(|m| m.report.as_ref());
    let success_count = reports.clone().map(|r| r.success_count).sum();
    let error_count = reports.map(|r| r.error_count).sum();
    let months_skipped = months.iter().filter(|m| m.skipped.is_some()).count();

    Ok(BatchReport {
        months,
        success_count,
        error_count,
        months_skipped,
        elapsed: started.elapsed(),
    })
}
