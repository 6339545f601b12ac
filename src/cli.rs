//! # CLI Module
//!
//! This module provides the command-line interface for era5split, including:
//! - Argument parsing with clap
//! - Environment variable support (`ERA5_YEAR`, `ERA5_MONTH` and the
//!   `ERA5SPLIT_` prefix)
//! - Merging command-line values with an optional configuration file
//! - Subcommands for splitting, batch splitting, inspection and completions

use crate::error::{SplitError, SplitResult};
use crate::input::{ExtractionSettings, FileConfig, resolve_period};
use crate::log::SummaryFormat;
use crate::output::{DEFAULT_OUTPUT_DIR, OutputNaming};
use crate::splitter::{FailurePolicy, SplitOptions};
use crate::timestep::{MonthRange, YearMonth};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Split monthly ERA5 NetCDF files into one file per 6-hourly timestep
#[derive(Parser, Debug)]
#[command(name = "era5split")]
#[command(about = "Split monthly ERA5 NetCDF files into one file per 6-hourly timestep")]
#[command(version)]
#[command(long_about = "
era5split turns a monthly ERA5 reanalysis file (4 fields per day at 00, 06, 12
and 18 UTC) into one NetCDF file per timestep, using the CDO `seltimestep`
operator. Output files are named after the absolute date and time they hold.

FEATURES:
  • Calendar-aware: 28 to 31 days per month, leap years included
  • Failure isolation: a failing timestep is counted and skipped, never fatal
  • Bounded parallelism, per-timestep timeouts and retries
  • Batch mode over a range of months
  • Time axis inspection before splitting
  • Configuration files: JSON and YAML

EXAMPLES:
  # Split one month, period taken from the file name
  era5split split era5_201802.nc

  # Explicit period through the environment
  ERA5_YEAR=2018 ERA5_MONTH=02 era5split split download.nc

  # Surface-level product with its own suffix and directory
  era5split split era5_sl_201802.nc --suffix sl --output-dir sl/

  # Every month from November 2017 to February 2018
  era5split batch raw/ --from 2017-11 --to 2018-02 --workers 4

  # Check a file before splitting it
  era5split info era5_201802.nc --year 2018 --month 02
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress banners and progress, log only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for summaries
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "ERA5SPLIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write logs to a timestamped file in this directory instead of stderr
    #[arg(long, global = true, env = "ERA5SPLIT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split one monthly file into per-timestep files
    #[command(long_about = "
Split one monthly ERA5 file into one file per 6-hourly timestep.

The year and month come from --year/--month (or ERA5_YEAR/ERA5_MONTH), then
the configuration file, then the input file name (era5_201802.nc). There is
no default month: if none of these is available the command fails.

Timesteps that fail are logged and counted; the run continues with the next
one. By default the exit status is 0 once the run completes; with
--fail-on-error it is 2 when any timestep failed.

EXAMPLES:
  era5split split era5_201802.nc
  era5split split download.nc --year 2018 --month 02 --output-dir temp/
  era5split split era5_201802.nc --workers 4 --timeout 600 --retries 1
  era5split split era5_201802.nc --dry-run
")]
    Split(SplitArgs),

    /// Split every monthly file of a month range
    #[command(long_about = "
Split the monthly files <INPUT_DIR>/<PREFIX><YYYYMM>.nc for every month of an
inclusive range. A month whose file is missing is reported and skipped.

EXAMPLES:
  era5split batch raw/ --from 2017-11 --to 2018-02
  era5split batch raw/ --from 201802 --input-prefix era5_sl_ --suffix sl
")]
    Batch(BatchArgs),

    /// Show the structure and time axis of a NetCDF file
    #[command(long_about = "
Display dimensions, variables and attributes of a NetCDF file. With a month
(from --year/--month or the file name) the time axis is checked against the
expected days * 4 timesteps starting at day 1, 00:00.

EXAMPLES:
  era5split info era5_201802.nc
  era5split info download.nc --year 2018 --month 02 --time-dim time
  era5split --output-format json info era5_201802.nc
")]
    Info {
        /// NetCDF file to inspect
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        period: PeriodArgs,

        /// Name of the time dimension (default: valid_time, then time)
        #[arg(long)]
        time_dim: Option<String>,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for various shells.

EXAMPLES:
  era5split completions bash > ~/.local/share/bash-completion/completions/era5split
  era5split completions zsh --output _era5split
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

impl From<OutputFormat> for SummaryFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => SummaryFormat::Human,
            OutputFormat::Json => SummaryFormat::Json,
            OutputFormat::Yaml => SummaryFormat::Yaml,
        }
    }
}

/// Year and month of the data.
///
/// Kept as text here: validation happens when the period is resolved, so a
/// malformed value is a precondition failure rather than a usage error.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodArgs {
    /// Four-digit year of the data
    #[arg(long, env = "ERA5_YEAR")]
    pub year: Option<String>,

    /// Two-digit month of the data (01-12)
    #[arg(long, env = "ERA5_MONTH")]
    pub month: Option<String>,
}

impl PeriodArgs {
    /// Resolves the period for `input`: these values, then the configuration
    /// file, then the file name.
    pub fn resolve(&self, file: &FileConfig, input: &Path) -> SplitResult<YearMonth> {
        let year = self.year.as_deref().or(file.year.as_deref());
        let month = self.month.as_deref().or(file.month.as_deref());
        resolve_period(year, month, input)
    }

    /// Like [`PeriodArgs::resolve`], but `None` when neither a complete
    /// year/month pair nor the file name gives a period.
    pub fn resolve_optional(&self, file: &FileConfig, input: &Path) -> SplitResult<Option<YearMonth>> {
        let year = self.year.as_deref().or(file.year.as_deref());
        let month = self.month.as_deref().or(file.month.as_deref());
        match (year, month) {
            (Some(_), Some(_)) => self.resolve(file, input).map(Some),
            (None, None) => Ok(crate::input::period_from_filename(input)),
            _ => {
                warn!("Ignoring a year or month given without its counterpart");
                Ok(crate::input::period_from_filename(input))
            }
        }
    }
}

/// Options shared by `split` and `batch`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionArgs {
    /// Directory for the per-timestep files [default: temp]
    #[arg(short, long, env = "ERA5SPLIT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Variant suffix appended to output names, e.g. sl or tp
    #[arg(long, env = "ERA5SPLIT_SUFFIX")]
    pub suffix: Option<String>,

    /// Number of extractions to run at once [default: 1]
    #[arg(short = 'j', long, env = "ERA5SPLIT_WORKERS", value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Per-timestep time limit
    #[arg(long, value_name = "SECONDS", env = "ERA5SPLIT_TIMEOUT", value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// Extra attempts for a failing timestep [default: 0]
    #[arg(long, env = "ERA5SPLIT_RETRIES")]
    pub retries: Option<u32>,

    /// Exit with status 2 when any timestep failed
    #[arg(long, env = "ERA5SPLIT_FAIL_ON_ERROR")]
    pub fail_on_error: bool,

    /// Delete the monthly input after a run without failures
    #[arg(long, env = "ERA5SPLIT_REMOVE_INPUT")]
    pub remove_input: bool,

    /// CDO executable to use instead of `cdo` from PATH
    #[arg(long, value_name = "PATH", env = "ERA5SPLIT_CDO")]
    pub cdo: Option<PathBuf>,

    /// Check preconditions and list planned outputs without extracting
    #[arg(long)]
    pub dry_run: bool,
}

impl ExtractionArgs {
    /// Merges these arguments with the configuration file.
    ///
    /// Priority: command line / environment > configuration file > default.
    pub fn resolve(&self, file: &FileConfig) -> SplitResult<ExtractionSettings> {
        let workers = self.workers.or(file.workers).unwrap_or(1);
        if workers == 0 {
            return Err(SplitError::Config("workers must be at least 1".to_string()));
        }

        let naming = OutputNaming::from_suffix(self.suffix.as_deref().or(file.suffix.as_deref()))?;
        let timeout = self
            .timeout
            .or(file.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(ExtractionSettings {
            output_dir: self
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            naming,
            options: SplitOptions {
                workers,
                timeout,
                retries: self.retries.or(file.retries).unwrap_or(0),
                remove_input: self.remove_input || file.remove_input.unwrap_or(false),
                dry_run: self.dry_run,
            },
            policy: FailurePolicy::from_flag(
                self.fail_on_error || file.fail_on_error.unwrap_or(false),
            ),
            cdo: self.cdo.clone().or_else(|| file.cdo.clone()),
        })
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SplitArgs {
    /// Monthly ERA5 NetCDF file to split
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub period: PeriodArgs,

    #[command(flatten)]
    pub extraction: ExtractionArgs,
}

impl SplitArgs {
    /// The input path from the command line or the configuration file.
    pub fn input_path(&self, file: &FileConfig) -> SplitResult<PathBuf> {
        self.input
            .clone()
            .or_else(|| file.input.clone())
            .ok_or(SplitError::MissingInput)
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BatchArgs {
    /// Directory holding the monthly files
    #[arg(value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// First month, as YYYY-MM or YYYYMM
    #[arg(long, value_name = "MONTH")]
    pub from: String,

    /// Last month, inclusive [default: same as --from]
    #[arg(long, value_name = "MONTH")]
    pub to: Option<String>,

    /// File name prefix of the monthly files [default: era5_]
    #[arg(long, env = "ERA5SPLIT_INPUT_PREFIX")]
    pub input_prefix: Option<String>,

    #[command(flatten)]
    pub extraction: ExtractionArgs,
}

impl BatchArgs {
    pub fn range(&self) -> SplitResult<MonthRange> {
        let start = YearMonth::parse_compact(&self.from)?;
        let end = match &self.to {
            Some(to) => YearMonth::parse_compact(to)?,
            None => start,
        };
        MonthRange::new(start, end)
    }

    pub fn prefix(&self, file: &FileConfig) -> String {
        self.input_prefix
            .clone()
            .or_else(|| file.input_prefix.clone())
            .unwrap_or_else(|| crate::batch::DEFAULT_INPUT_PREFIX.to_string())
    }
}

/// Parse the worker count, which must be at least 1
fn parse_workers(s: &str) -> Result<usize, String> {
    let workers: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid worker count: '{}'", s))?;
    if workers == 0 {
        return Err("Worker count must be at least 1".to_string());
    }
    Ok(workers)
}

/// Parse a timeout in whole seconds, which must be positive
fn parse_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid timeout: '{}' (expected whole seconds)", s))?;
    if secs == 0 {
        return Err("Timeout must be at least 1 second".to_string());
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Global mutex to ensure environment variable tests run sequentially
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("4").unwrap(), 4);
        assert_eq!(parse_workers(" 1 ").unwrap(), 1);
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("-2").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("600").unwrap(), 600);
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("1.5").is_err());
    }

    #[test]
    fn test_extraction_defaults() {
        let settings = ExtractionArgs::default().resolve(&FileConfig::default()).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("temp"));
        assert_eq!(settings.naming, OutputNaming::default());
        assert_eq!(settings.options, SplitOptions::default());
        assert_eq!(settings.policy, FailurePolicy::Lenient);
        assert_eq!(settings.cdo, None);
    }

    #[test]
    fn test_extraction_merge_priority() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("from-config")),
            suffix: Some("tp".to_string()),
            workers: Some(8),
            timeout_secs: Some(30),
            retries: Some(2),
            fail_on_error: Some(true),
            ..FileConfig::default()
        };
        let args = ExtractionArgs {
            output_dir: Some(PathBuf::from("from-cli")),
            workers: Some(2),
            ..ExtractionArgs::default()
        };

        let settings = args.resolve(&file).unwrap();
        // command line wins
        assert_eq!(settings.output_dir, PathBuf::from("from-cli"));
        assert_eq!(settings.options.workers, 2);
        // configuration fills the gaps
        assert_eq!(settings.naming.suffix(), Some("tp"));
        assert_eq!(settings.options.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.options.retries, 2);
        assert_eq!(settings.policy, FailurePolicy::Strict);
    }

    #[test]
    fn test_extraction_rejects_bad_config_values() {
        let zero_workers = FileConfig {
            workers: Some(0),
            ..FileConfig::default()
        };
        assert!(matches!(
            ExtractionArgs::default().resolve(&zero_workers),
            Err(SplitError::Config(_))
        ));

        let bad_suffix = FileConfig {
            suffix: Some("a_b".to_string()),
            ..FileConfig::default()
        };
        assert!(ExtractionArgs::default().resolve(&bad_suffix).is_err());
    }

    #[test]
    fn test_period_resolution_sources() {
        let input = Path::new("era5_201802.nc");
        let none = PeriodArgs::default();
        let file = FileConfig {
            year: Some("2019".to_string()),
            month: Some("07".to_string()),
            ..FileConfig::default()
        };
        let cli = PeriodArgs {
            year: Some("2020".to_string()),
            month: Some("01".to_string()),
        };

        assert_eq!(none.resolve(&FileConfig::default(), input).unwrap().to_string(), "201802");
        assert_eq!(none.resolve(&file, input).unwrap().to_string(), "201907");
        assert_eq!(cli.resolve(&file, input).unwrap().to_string(), "202001");

        assert_eq!(
            none.resolve_optional(&FileConfig::default(), Path::new("data.nc")).unwrap(),
            None
        );

        // a lone year from any source leaves the file name in charge
        let year_only = PeriodArgs {
            year: Some("2020".to_string()),
            month: None,
        };
        assert_eq!(year_only.resolve(&FileConfig::default(), input).unwrap().to_string(), "201802");
        assert_eq!(
            year_only.resolve_optional(&FileConfig::default(), Path::new("data.nc")).unwrap(),
            None
        );
        assert!(matches!(
            year_only.resolve(&FileConfig::default(), Path::new("data.nc")),
            Err(SplitError::InvalidDate(_))
        ));

        // one value from the command line and one from the file form a pair
        let month_file = FileConfig {
            month: Some("05".to_string()),
            ..FileConfig::default()
        };
        assert_eq!(year_only.resolve(&month_file, input).unwrap().to_string(), "202005");
    }

    #[test]
    fn test_split_input_sources() {
        let file = FileConfig {
            input: Some(PathBuf::from("from_config.nc")),
            ..FileConfig::default()
        };
        let without = SplitArgs {
            input: None,
            period: PeriodArgs::default(),
            extraction: ExtractionArgs::default(),
        };
        let with = SplitArgs {
            input: Some(PathBuf::from("from_cli.nc")),
            ..without.clone()
        };

        assert!(matches!(
            without.input_path(&FileConfig::default()),
            Err(SplitError::MissingInput)
        ));
        assert_eq!(without.input_path(&file).unwrap(), PathBuf::from("from_config.nc"));
        assert_eq!(with.input_path(&file).unwrap(), PathBuf::from("from_cli.nc"));
    }

    #[test]
    fn test_batch_range() {
        let args = BatchArgs {
            input_dir: PathBuf::from("raw"),
            from: "2017-11".to_string(),
            to: Some("201802".to_string()),
            input_prefix: None,
            extraction: ExtractionArgs::default(),
        };
        assert_eq!(args.range().unwrap().len(), 4);
        assert_eq!(args.prefix(&FileConfig::default()), "era5_");

        let single = BatchArgs {
            to: None,
            ..args.clone()
        };
        assert_eq!(single.range().unwrap().len(), 1);

        let reversed = BatchArgs {
            from: "2018-03".to_string(),
            to: Some("2018-02".to_string()),
            ..args
        };
        assert!(matches!(reversed.range(), Err(SplitError::InvalidDate(_))));
    }

    #[test]
    fn test_environment_period_and_options() {
        // Acquire mutex to ensure exclusive access to environment variables
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let saved: Vec<(&str, Option<String>)> = ["ERA5_YEAR", "ERA5_MONTH", "ERA5SPLIT_WORKERS"]
            .iter()
            .map(|k| (*k, env::var(k).ok()))
            .collect();

        unsafe {
            env::set_var("ERA5_YEAR", "2018");
            env::set_var("ERA5_MONTH", "02");
            env::set_var("ERA5SPLIT_WORKERS", "3");
        }

        let cli = Cli::parse_from(["era5split", "split", "download.nc"]);
        if let Commands::Split(args) = &cli.command {
            assert_eq!(args.period.year.as_deref(), Some("2018"));
            assert_eq!(args.period.month.as_deref(), Some("02"));
            assert_eq!(args.extraction.workers, Some(3));
        } else {
            panic!("Expected split command");
        }

        // command line beats the environment
        let cli = Cli::parse_from(["era5split", "split", "download.nc", "--month", "03"]);
        if let Commands::Split(args) = &cli.command {
            assert_eq!(args.period.month.as_deref(), Some("03"));
        } else {
            panic!("Expected split command");
        }

        // Restore original environment
        unsafe {
            for (key, value) in saved {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
