//! # Input Configuration Module
//!
//! This module loads optional configuration files and works out the period a
//! monthly input file covers.
//!
//! ## Configuration Files
//!
//! A configuration file may set any of the options the command line accepts.
//! JSON is the default; files ending in `.yaml` or `.yml` are read as YAML.
//! Values given on the command line or through environment variables always
//! take precedence over the file.
//!
//! ```yaml
//! year: "2018"
//! month: "02"
//! output_dir: temp/
//! suffix: sl
//! workers: 4
//! timeout_secs: 600
//! remove_input: true
//! ```
//!
//! `year` and `month` are strings so the two-digit month form survives YAML
//! parsing.
//!
//! ## Period Resolution
//!
//! The `(year, month)` of a run comes from, in order:
//! 1. `--year` / `--month` (or `ERA5_YEAR` / `ERA5_MONTH`)
//! 2. the configuration file
//! 3. the input file name (`era5_201802.nc`, `era5_sl_201802.nc`)
//!
//! There is no built-in fallback month.
//!
//! ```rust
//! use era5split::input::resolve_period;
//! use std::path::Path;
//!
//! let period = resolve_period(None, None, Path::new("downloads/era5_sl_201802.nc"))?;
//! assert_eq!(period.to_string(), "201802");
//!
//! let period = resolve_period(Some("2020"), Some("02"), Path::new("era5_201802.nc"))?;
//! assert_eq!(period.total_timesteps(), 116);
//! # Ok::<(), era5split::error::SplitError>(())
//! ```

use crate::error::{SplitError, SplitResult};
use crate::extract::CdoExtractor;
use crate::output::OutputNaming;
use crate::splitter::{FailurePolicy, SplitOptions};
use crate::timestep::YearMonth;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Options read from a JSON or YAML configuration file.
///
/// Every field is optional; absent fields fall back to the command line,
/// environment or built-in defaults.
///
/// # Examples
///
/// ```rust
/// use era5split::input::FileConfig;
///
/// let config = FileConfig::from_json(r#"{ "year": "2018", "month": "02", "workers": 2 }"#)?;
/// assert_eq!(config.month.as_deref(), Some("02"));
/// assert_eq!(config.workers, Some(2));
/// # Ok::<(), era5split::error::SplitError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Monthly input file for `split`
    pub input: Option<PathBuf>,
    /// Four-digit year
    pub year: Option<String>,
    /// Two-digit month
    pub month: Option<String>,
    /// Directory receiving the per-timestep files
    pub output_dir: Option<PathBuf>,
    /// Variant suffix, e.g. `sl` or `tp`
    pub suffix: Option<String>,
    /// Concurrent extractions
    pub workers: Option<usize>,
    /// Per-extraction time limit in seconds
    pub timeout_secs: Option<u64>,
    /// Extra attempts for a failing timestep
    pub retries: Option<u32>,
    /// Exit with status 2 when any timestep failed
    pub fail_on_error: Option<bool>,
    /// Delete the monthly input after a fully successful run
    pub remove_input: Option<bool>,
    /// CDO executable to use instead of `cdo` from `PATH`
    pub cdo: Option<PathBuf>,
    /// File name prefix of monthly inputs in batch mode
    pub input_prefix: Option<String>,
    /// Directory for log files
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Loads a configuration file, picking the format from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::Config`] when the file cannot be read or parsed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use era5split::input::FileConfig;
    ///
    /// let config = FileConfig::from_file("era5split.yaml")?;
    /// println!("Workers: {:?}", config.workers);
    /// # Ok::<(), era5split::error::SplitError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> SplitResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SplitError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let parsed = if is_yaml {
            FileConfig::from_yaml(&content)
        } else {
            FileConfig::from_json(&content)
        };
        parsed.map_err(|e| match e {
            SplitError::Config(msg) => SplitError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_json(json_str: &str) -> SplitResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| SplitError::Config(format!("invalid JSON configuration: {}", e)))
    }

    pub fn from_yaml(yaml_str: &str) -> SplitResult<Self> {
        // an empty YAML document means "no settings"
        if yaml_str.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        serde_yaml::from_str(yaml_str)
            .map_err(|e| SplitError::Config(format!("invalid YAML configuration: {}", e)))
    }
}

/// Fully resolved extraction settings shared by `split` and `batch`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    pub output_dir: PathBuf,
    pub naming: OutputNaming,
    pub options: SplitOptions,
    pub policy: FailurePolicy,
    pub cdo: Option<PathBuf>,
}

impl ExtractionSettings {
    /// The CDO backend these settings point at.
    pub fn extractor(&self) -> CdoExtractor {
        match &self.cdo {
            Some(binary) => CdoExtractor::with_binary(binary.clone()),
            None => CdoExtractor::new(),
        }
    }
}

/// Determines the period of a run.
///
/// An explicit year and month override the file name only when both are
/// present. A lone year or month is ignored with a warning and the period
/// comes from the file name.
///
/// # Errors
///
/// Returns [`SplitError::InvalidDate`] when the explicit values are malformed,
/// or when no complete pair was given and the file name carries no `YYYYMM`
/// token.
pub fn resolve_period(year: Option<&str>, month: Option<&str>, input: &Path) -> SplitResult<YearMonth> {
    match (year, month) {
        (Some(year), Some(month)) => return YearMonth::parse(year, month),
        (Some(year), None) => warn!("Ignoring year {} given without a month", year),
        (None, Some(month)) => warn!("Ignoring month {} given without a year", month),
        (None, None) => {}
    }
    period_from_filename(input).ok_or_else(|| {
        SplitError::InvalidDate(format!(
            "no year/month given and none found in file name '{}'; set --year and --month (or ERA5_YEAR and ERA5_MONTH)",
            input.display()
        ))
    })
}

/// Reads `YYYYMM` from the first `_`-separated token of the file stem that
/// consists of exactly six digits.
///
/// ```rust
/// use era5split::input::period_from_filename;
/// use std::path::Path;
///
/// assert_eq!(period_from_filename(Path::new("era5_201802.nc")).unwrap().month(), 2);
/// assert!(period_from_filename(Path::new("era5_2018.nc")).is_none());
/// ```
pub fn period_from_filename(path: &Path) -> Option<YearMonth> {
    let stem = path.file_stem()?.to_str()?;
    let token = stem
        .split('_')
        .find(|t| t.len() == 6 && t.bytes().all(|b| b.is_ascii_digit()))?;
    YearMonth::parse_compact(token).ok()
}

/// The monthly input file expected for `period` in batch mode.
pub fn monthly_input_path(dir: &Path, prefix: &str, period: YearMonth) -> PathBuf {
    dir.join(format!("{}{}.nc", prefix, period))
}
