//! Exit codes for CLI operations following Unix conventions.
//!
//! - `0`: Success - operation completed, results found
//! - `1`: General error - unspecified failure
//! - `3-125`: Specific recoverable errors

use crate::error::AnalyzeError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Symbol not found but command executed successfully (code 3)
    NotFound = 3,

    /// Resolution failed: no descriptor/artifacts/reference set (code 4)
    ResolutionError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Operation not supported (code 8)
    UnsupportedOperation = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<&AnalyzeError> for ExitCode {
    fn from(err: &AnalyzeError) -> Self {
        match err {
            AnalyzeError::Configuration { .. } => Self::ConfigError,
            AnalyzeError::NotFound { .. } => Self::ResolutionError,
            AnalyzeError::Unsupported { .. } => Self::UnsupportedOperation,
            AnalyzeError::Io { .. } => Self::IoError,
            AnalyzeError::Metadata { .. } => Self::GeneralError,
            AnalyzeError::Cancelled => Self::GeneralError,
        }
    }
}

impl ExitCode {
    /// Exit code for an analyze result based on descriptor presence.
    pub fn from_analyze_result<T>(result: &Option<T>) -> Self {
        match result {
            Some(_) => Self::Success,
            None => Self::NotFound,
        }
    }
}
