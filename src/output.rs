//! # Output Naming and Inventory
//!
//! This module owns everything about the files a split run leaves behind:
//! their names, the directory they land in, and the post-extraction checks
//! that decide whether a timestep really produced a file.
//!
//! ## Naming
//!
//! - **Pressure levels** (default): `era5_<YYYY><MM><DD>_<HH>00.nc`
//! - **Variant suffix**: `era5_<YYYY><MM><DD>_<HH>00_<suffix>.nc`, used for the
//!   surface-level (`sl`) and precipitation (`tp`) products
//!
//! ```rust
//! use era5split::output::OutputNaming;
//! use era5split::timestep::YearMonth;
//!
//! let feb = YearMonth::parse("2018", "02")?;
//! let step = feb.timestep(19).unwrap();
//!
//! assert_eq!(OutputNaming::default().file_name(feb, &step), "era5_20180205_1200.nc");
//! assert_eq!(
//!     OutputNaming::with_suffix("sl")?.file_name(feb, &step),
//!     "era5_20180205_1200_sl.nc"
//! );
//! # Ok::<(), era5split::error::SplitError>(())
//! ```

use crate::error::{SplitError, SplitResult};
use crate::timestep::{Timestep, YearMonth};
use log::debug;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Output directory used when none is configured
pub const DEFAULT_OUTPUT_DIR: &str = "temp";

const FILE_PREFIX: &str = "era5_";
const FILE_EXTENSION: &str = ".nc";

/// Naming convention for per-timestep output files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputNaming {
    suffix: Option<String>,
}

impl OutputNaming {
    /// Naming with a variant suffix appended after the time component.
    ///
    /// The suffix must be non-empty and consist of ASCII letters, digits or
    /// `-`, so it can never be confused with the `_`-separated date fields.
    pub fn with_suffix(suffix: &str) -> SplitResult<Self> {
        let suffix = suffix.trim();
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(SplitError::Config(format!(
                "output suffix '{}' must be non-empty and contain only letters, digits or '-'",
                suffix
            )));
        }
        Ok(OutputNaming {
            suffix: Some(suffix.to_string()),
        })
    }

    /// Builds the naming from an optional suffix, `None` meaning the default.
    pub fn from_suffix(suffix: Option<&str>) -> SplitResult<Self> {
        match suffix {
            Some(s) => OutputNaming::with_suffix(s),
            None => Ok(OutputNaming::default()),
        }
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn file_name(&self, period: YearMonth, step: &Timestep) -> String {
        let base = format!(
            "{}{:04}{:02}{:02}_{:02}00",
            FILE_PREFIX,
            period.year(),
            period.month(),
            step.day,
            step.hour
        );
        match &self.suffix {
            Some(suffix) => format!("{}_{}{}", base, suffix, FILE_EXTENSION),
            None => format!("{}{}", base, FILE_EXTENSION),
        }
    }

    pub fn output_path(&self, dir: &Path, period: YearMonth, step: &Timestep) -> PathBuf {
        dir.join(self.file_name(period, step))
    }

    /// Recovers `(day, hour)` from a file name produced for `period`, or
    /// `None` when the name does not follow this naming for that month.
    pub fn parse_file_name(&self, name: &str, period: YearMonth) -> Option<(u32, u32)> {
        let stem = name.strip_suffix(FILE_EXTENSION)?;
        let stem = match &self.suffix {
            Some(suffix) => stem.strip_suffix(suffix.as_str())?.strip_suffix('_')?,
            None => stem,
        };
        let (date, time) = stem.strip_prefix(FILE_PREFIX)?.split_once('_')?;
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if date.len() != 8 || time.len() != 4 || !all_digits(date) || !all_digits(time) {
            return None;
        }
        if date[..6] != period.to_string() || &time[2..] != "00" {
            return None;
        }

        let day: u32 = date[6..].parse().ok()?;
        let hour: u32 = time[..2].parse().ok()?;
        let valid_hour = hour % crate::timestep::HOURS_PER_STEP == 0 && hour < 24;
        if day == 0 || day > period.days() || !valid_hour {
            return None;
        }
        Some((day, hour))
    }

    /// Every file name a fully successful run over `period` produces, in index order.
    pub fn planned_files(&self, period: YearMonth) -> Vec<String> {
        period
            .timesteps()
            .map(|step| self.file_name(period, &step))
            .collect()
    }
}

/// Creates the output directory (and parents) if it does not exist yet.
pub fn ensure_output_dir(dir: &Path) -> SplitResult<()> {
    if !dir.exists() {
        debug!("Creating output directory: {}", dir.display());
    }
    fs::create_dir_all(dir).map_err(SplitError::Io)
}

/// Size of a freshly extracted file, or `None` when it is absent or empty.
///
/// The extraction tool's own exit status is not trusted on its own: CDO can
/// exit successfully without having written anything.
pub async fn verified_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

/// Files in `dir` matching the naming pattern for `period`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_outputs(dir: &Path, naming: &OutputNaming, period: YearMonth) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(name) = name.to_str()
            && naming.parse_file_name(name, period).is_some()
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn count_outputs(dir: &Path, naming: &OutputNaming, period: YearMonth) -> io::Result<usize> {
    list_outputs(dir, naming, period).map(|files| files.len())
}

/// Deletes the monthly source file, returning the number of bytes freed.
pub fn remove_source_file(path: &Path) -> io::Result<u64> {
    let size = fs::metadata(path)?.len();
    fs::remove_file(path)?;
    Ok(size)
}

/// Formats a byte count the way the rest of the tool reports sizes.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_048_576.0)
}
