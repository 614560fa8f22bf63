//! Error types for transplant operations.
//!
//! Only fatal conditions live here: load failures, invalid mapping tables and
//! malformed checkpoints. Per-key problems during a transfer run are never
//! errors; they are captured as [`crate::transfer::TransferOutcome`] values.

use std::fmt;

/// Main error type for transplant operations.
///
/// # Examples
///
/// ```
/// use transplant::error::TransplantError;
///
/// let err = TransplantError::OverlappingBranches {
///     layer: 4,
///     first: "rgb".to_string(),
///     second: "nir".to_string(),
/// };
/// assert!(err.to_string().contains("claimed by both"));
/// ```
#[derive(Debug)]
pub enum TransplantError {
    /// I/O error (file not found, permission denied, etc.).
    Io(std::io::Error),

    /// Invalid or corrupt tensor file.
    Format {
        /// Error description
        message: String,
    },

    /// Two branches of a mapping table claim the same target layer.
    OverlappingBranches {
        /// Target layer index claimed twice
        layer: usize,
        /// Branch that claimed it first
        first: String,
        /// Branch that claimed it again
        second: String,
    },

    /// A branch maps two target layers onto the same donor layer.
    NonInjectiveMapping {
        /// Branch name
        branch: String,
        /// Donor layer reached twice
        donor_layer: usize,
    },

    /// Structurally invalid mapping table or reduction policy.
    InvalidMapping {
        /// Error description
        message: String,
    },

    /// A branch refers to a donor that was not supplied.
    MissingDonor {
        /// Branch name
        branch: String,
        /// Donor id the branch expects
        donor: String,
    },

    /// The channel reduction operator was asked to do something that is not
    /// an input-channel compression.
    InvalidReduction {
        /// Donor tensor shape
        source: Vec<usize>,
        /// Requested target shape
        target: Vec<usize>,
        /// Why the request was rejected
        reason: String,
    },

    /// Plan file could not be parsed or validated.
    Config {
        /// Error description
        message: String,
    },

    /// Checkpoint could not be assembled or read back.
    Checkpoint {
        /// Error description
        message: String,
    },
}

impl fmt::Display for TransplantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransplantError::Io(e) => write!(f, "I/O error: {e}"),
            TransplantError::Format { message } => {
                write!(f, "Invalid tensor file: {message}")
            }
            TransplantError::OverlappingBranches {
                layer,
                first,
                second,
            } => {
                write!(
                    f,
                    "Target layer {layer} is claimed by both branch '{first}' and branch '{second}'"
                )
            }
            TransplantError::NonInjectiveMapping {
                branch,
                donor_layer,
            } => {
                write!(
                    f,
                    "Branch '{branch}' maps more than one target layer onto donor layer {donor_layer}"
                )
            }
            TransplantError::InvalidMapping { message } => {
                write!(f, "Invalid mapping table: {message}")
            }
            TransplantError::MissingDonor { branch, donor } => {
                write!(f, "Branch '{branch}' requires donor '{donor}', which was not loaded")
            }
            TransplantError::InvalidReduction {
                source,
                target,
                reason,
            } => {
                write!(
                    f,
                    "Cannot reduce {source:?} to {target:?}: {reason}"
                )
            }
            TransplantError::Config { message } => write!(f, "Invalid plan: {message}"),
            TransplantError::Checkpoint { message } => {
                write!(f, "Checkpoint error: {message}")
            }
        }
    }
}

impl std::error::Error for TransplantError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransplantError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransplantError {
    fn from(err: std::io::Error) -> Self {
        TransplantError::Io(err)
    }
}

impl From<String> for TransplantError {
    fn from(message: String) -> Self {
        TransplantError::Format { message }
    }
}

impl From<&str> for TransplantError {
    fn from(message: &str) -> Self {
        TransplantError::Format {
            message: message.to_string(),
        }
    }
}

impl TransplantError {
    /// Create a reduction rejection with shapes attached
    #[must_use]
    pub fn invalid_reduction(source: &[usize], target: &[usize], reason: impl Into<String>) -> Self {
        Self::InvalidReduction {
            source: source.to_vec(),
            target: target.to_vec(),
            reason: reason.into(),
        }
    }

    /// True for errors raised by mapping-table construction.
    #[must_use]
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            Self::OverlappingBranches { .. }
                | Self::NonInjectiveMapping { .. }
                | Self::InvalidMapping { .. }
        )
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, TransplantError>;
