//! # Error Types
//!
//! Two families of errors are used throughout the crate:
//!
//! - [`SplitError`]: precondition failures that abort a whole run (invalid
//!   year/month, missing input file, missing extraction tool, bad
//!   configuration). The binary maps every variant to exit status 1.
//! - [`TimestepError`]: failures scoped to a single timestep. These are
//!   recorded in the run report and counted, never propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a split run before (or instead of) extracting timesteps
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Input file not found or unreadable: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Extraction tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Missing input file argument")]
    MissingInput,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fatal split operations
pub type SplitResult<T> = Result<T, SplitError>;

/// Per-timestep failures, absorbed into the run's error counter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestepError {
    #[error("extraction failed for timestep {index}: {message}")]
    Extraction { index: usize, message: String },

    #[error("extraction of timestep {index} timed out after {limit_ms} ms")]
    Timeout { index: usize, limit_ms: u64 },

    #[error("extraction of timestep {index} reported success but {} is missing or empty", .path.display())]
    OutputMissing { index: usize, path: PathBuf },
}

impl TimestepError {
    /// The 1-based timestep index the failure belongs to
    pub fn index(&self) -> usize {
        match self {
            TimestepError::Extraction { index, .. }
            | TimestepError::Timeout { index, .. }
            | TimestepError::OutputMissing { index, .. } => *index,
        }
    }

    /// Short machine-friendly label used in structured summaries
    pub fn kind(&self) -> &'static str {
        match self {
            TimestepError::Extraction { .. } => "extraction",
            TimestepError::Timeout { .. } => "timeout",
            TimestepError::OutputMissing { .. } => "output_missing",
        }
    }
}

/// Coarse classification of [`SplitError`], handy for assertions and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitErrorKind {
    InvalidDate,
    InputNotFound,
    ToolUnavailable,
    MissingInput,
    Config,
    Io,
}

impl SplitError {
    pub fn kind(&self) -> SplitErrorKind {
        match self {
            SplitError::InvalidDate(_) => SplitErrorKind::InvalidDate,
            SplitError::InputNotFound(_) => SplitErrorKind::InputNotFound,
            SplitError::ToolUnavailable(_) => SplitErrorKind::ToolUnavailable,
            SplitError::MissingInput => SplitErrorKind::MissingInput,
            SplitError::Config(_) => SplitErrorKind::Config,
            SplitError::Io(_) => SplitErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestep_error_index_and_kind() {
        let err = TimestepError::OutputMissing {
            index: 7,
            path: PathBuf::from("temp/era5_20180202_1200.nc"),
        };
        assert_eq!(err.index(), 7);
        assert_eq!(err.kind(), "output_missing");
        assert!(err.to_string().contains("era5_20180202_1200.nc"));

        let err = TimestepError::Timeout {
            index: 3,
            limit_ms: 2500,
        };
        assert_eq!(
            err.to_string(),
            "extraction of timestep 3 timed out after 2500 ms"
        );
    }

    #[test]
    fn test_split_error_kind() {
        assert_eq!(
            SplitError::InvalidDate("13".into()).kind(),
            SplitErrorKind::InvalidDate
        );
        assert_eq!(SplitError::MissingInput.kind(), SplitErrorKind::MissingInput);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(SplitError::from(io).kind(), SplitErrorKind::Io);
    }
}
