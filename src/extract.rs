//! # Timestep Extraction
//!
//! The splitter never reads NetCDF content itself. Pulling a single timestep
//! out of a monthly file is delegated to a [`TimestepExtractor`], so the
//! orchestration logic can be exercised with fakes and the subprocess backend
//! can be swapped without touching it.
//!
//! ## Key Components
//!
//! - [`TimestepExtractor`]: the injected capability
//! - [`CdoExtractor`]: runs `cdo -O seltimestep,<index> <input> <output>`
//! - [`locate_executable`]: `PATH` lookup used for the availability check

use crate::error::{SplitError, TimestepError};
use async_trait::async_trait;
use log::debug;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Default name of the CDO executable
pub const DEFAULT_CDO_BINARY: &str = "cdo";

/// Something that can write timestep `index` of `input` to `output`.
///
/// Implementations must be idempotent per output path: extracting the same
/// index twice overwrites the previous file.
#[async_trait]
pub trait TimestepExtractor: Send + Sync {
    /// Short human-readable name used in logs and summaries
    fn name(&self) -> &str;

    /// Confirms the capability is usable, returning the resolved program path.
    fn check_available(&self) -> Result<PathBuf, SplitError>;

    /// Extracts the 1-based timestep `index` from `input` into `output`.
    async fn extract(&self, input: &Path, index: usize, output: &Path) -> Result<(), TimestepError>;
}

/// Extraction backed by the CDO command-line tool.
#[derive(Debug, Clone)]
pub struct CdoExtractor {
    binary: OsString,
}

impl Default for CdoExtractor {
    fn default() -> Self {
        CdoExtractor::new()
    }
}

impl CdoExtractor {
    pub fn new() -> Self {
        CdoExtractor {
            binary: OsString::from(DEFAULT_CDO_BINARY),
        }
    }

    /// Uses a specific executable instead of `cdo` from `PATH`.
    pub fn with_binary(binary: impl Into<OsString>) -> Self {
        CdoExtractor {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &OsStr {
        &self.binary
    }

    /// Arguments passed to CDO for one timestep.
    pub fn command_args(input: &Path, index: usize, output: &Path) -> Vec<OsString> {
        vec![
            OsString::from("-O"),
            OsString::from(format!("seltimestep,{}", index)),
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl TimestepExtractor for CdoExtractor {
    fn name(&self) -> &str {
        "cdo"
    }

    fn check_available(&self) -> Result<PathBuf, SplitError> {
        locate_executable(&self.binary).ok_or_else(|| {
            SplitError::ToolUnavailable(format!(
                "'{}' was not found on PATH or is not executable; install CDO (Climate Data Operators)",
                self.binary.to_string_lossy()
            ))
        })
    }

    async fn extract(&self, input: &Path, index: usize, output: &Path) -> Result<(), TimestepError> {
        let args = CdoExtractor::command_args(input, index, output);
        debug!(
            "Running: {} {}",
            self.binary.to_string_lossy(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output_status = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(TimestepError::Extraction {
                    index,
                    message: format!("failed to run {}: {}", self.binary.to_string_lossy(), e),
                });
            }
        };

        if output_status.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output_status.stderr);
        let stderr = stderr.trim();
        let message = match (output_status.status.code(), stderr.is_empty()) {
            (Some(code), true) => format!("cdo exited with status {}", code),
            (Some(code), false) => format!("cdo exited with status {}: {}", code, stderr),
            (None, true) => "cdo was terminated by a signal".to_string(),
            (None, false) => format!("cdo was terminated by a signal: {}", stderr),
        };
        Err(TimestepError::Extraction { index, message })
    }
}

/// Resolves `program` to an executable file.
///
/// Names containing a path separator are checked as given; bare names are
/// searched in every `PATH` entry in order.
pub fn locate_executable(program: &OsStr) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
