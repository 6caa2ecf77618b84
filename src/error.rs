//! Error taxonomy for the audit engine.
//!
//! Every variant maps to a process exit code so the binary can stay a thin
//! wrapper around the library:
//!
//! - `2` bad input or configuration (including I/O and parse failures)
//! - `3` not enough usable observations
//! - `4` numerical failures (non-convergence, degenerate statistics)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Zero or too few observations after filtering.
    #[error("Insufficient data: {available} observation(s), need at least {required}.")]
    InsufficientData { available: usize, required: usize },

    /// A weight is non-positive or non-finite.
    #[error("Invalid weight {value} at observation {index} (weights must be finite and > 0).")]
    InvalidWeight { index: usize, value: f64 },

    /// A solve did not meet its stopping criteria within the iteration budget.
    #[error("Fit did not converge within {iterations} iterations.")]
    NonConvergence { iterations: usize },

    /// The null distribution has zero spread, so a z-score is undefined.
    #[error("Null distribution is degenerate ({samples} sample(s), std = {std}); significance undefined.")]
    DegenerateNull { samples: usize, std: f64 },

    /// A residual sum of squares is zero (or `n == 0`), so `ln(RSS/n)` is undefined.
    #[error("Model comparison is degenerate: {reason}")]
    DegenerateModelComparison { reason: String },

    /// Malformed input arrays or configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidWeight { .. }
            | Self::InvalidInput(_)
            | Self::Io(_)
            | Self::Csv(_)
            | Self::Json(_) => 2,
            Self::InsufficientData { .. } => 3,
            Self::NonConvergence { .. }
            | Self::DegenerateNull { .. }
            | Self::DegenerateModelComparison { .. } => 4,
        }
    }

    /// Whether the audit must abort on this error.
    ///
    /// Degenerate statistics are reported as explicit "undefined" states in the
    /// verdict instead of aborting the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::DegenerateNull { .. } | Self::DegenerateModelComparison { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
