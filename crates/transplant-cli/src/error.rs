//! Error types for transplant-cli

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use transplant::TransplantError;

/// Result type alias for CLI operations
pub(crate) type Result<T> = std::result::Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug)]
pub(crate) enum CliError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Bad command-line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Tensor file or checkpoint could not be read
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Plan, mapping table or donor set rejected before transfer
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON report could not be written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other library failure
    #[error("Transplant error: {0}")]
    Transplant(String),
}

impl CliError {
    /// Get exit code for this error
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidArgument(_) => ExitCode::from(2),
            Self::FileNotFound(_) => ExitCode::from(3),
            Self::InvalidFormat(_) => ExitCode::from(4),
            Self::InvalidPlan(_) => ExitCode::from(5),
            Self::Io(_) => ExitCode::from(7),
            Self::Json(_) | Self::Transplant(_) => ExitCode::from(1),
        }
    }
}

impl From<TransplantError> for CliError {
    fn from(e: TransplantError) -> Self {
        match e {
            TransplantError::Io(io) => Self::Io(io),
            TransplantError::Format { .. } | TransplantError::Checkpoint { .. } => {
                Self::InvalidFormat(e.to_string())
            }
            TransplantError::MissingDonor { .. } | TransplantError::Config { .. } => {
                Self::InvalidPlan(e.to_string())
            }
            e if e.is_mapping_error() => Self::InvalidPlan(e.to_string()),
            e => Self::Transplant(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_errors_are_plan_errors() {
        let err: CliError = TransplantError::OverlappingBranches {
            layer: 4,
            first: "rgb".to_string(),
            second: "nir".to_string(),
        }
        .into();
        assert!(matches!(err, CliError::InvalidPlan(_)));
        assert_eq!(err.exit_code(), ExitCode::from(5));
    }

    #[test]
    fn test_missing_donor_is_plan_error() {
        let err: CliError = TransplantError::MissingDonor {
            branch: "nir".to_string(),
            donor: "nir".to_string(),
        }
        .into();
        assert!(err.to_string().contains("requires donor 'nir'"));
        assert_eq!(err.exit_code(), ExitCode::from(5));
    }

    #[test]
    fn test_io_error_keeps_io_exit_code() {
        let err: CliError =
            TransplantError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).into();
        assert!(matches!(err, CliError::Io(_)));
        assert_eq!(err.exit_code(), ExitCode::from(7));
    }

    #[test]
    fn test_checkpoint_error_is_format_error() {
        let err: CliError = TransplantError::Checkpoint {
            message: "bad epoch".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::from(4));
    }

    #[test]
    fn test_reduction_error_is_generic() {
        let err: CliError = TransplantError::InvalidReduction {
            source: vec![8, 3, 3, 3],
            target: vec![8, 2, 3, 3],
            reason: "only reduction to a single input channel is supported".to_string(),
        }
        .into();
        assert!(matches!(err, CliError::Transplant(_)));
        assert_eq!(err.exit_code(), ExitCode::from(1));
    }
}
