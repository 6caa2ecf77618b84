//! Audit verdict assembly.
//!
//! The verdict is a pure aggregation of the primary fit, the resampling summary
//! and the model comparison. Degenerate statistics appear as explicit
//! `Undefined` states rather than errors.

pub mod format;

use serde::{Deserialize, Serialize};

use crate::domain::{AuditConfig, FitResult, Scaling, Strategy};
use crate::error::Result;
use crate::fit::ModelComparison;
use crate::significance::{
    BootstrapDistribution, BootstrapSummary, NullDistribution, ResamplingRun, Score, empirical_p_value,
    gaussian_p_value, significance, summarize_bootstrap,
};

pub use format::*;

/// Fitted dipole direction in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub longitude_deg: f64,
    pub latitude_deg: f64,
}

/// Information-criterion comparison, or the reason it is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AicComparison {
    Defined(ModelComparison),
    Undefined { reason: String },
}

impl AicComparison {
    /// Map a comparison result, turning non-fatal (degenerate) errors into `Undefined`.
    pub fn from_result(result: Result<ModelComparison>) -> Result<Self> {
        match result {
            Ok(cmp) => Ok(AicComparison::Defined(cmp)),
            Err(e) if !e.is_fatal() => Ok(AicComparison::Undefined { reason: e.to_string() }),
            Err(e) => Err(e),
        }
    }

    pub fn delta_aic(&self) -> Option<f64> {
        match self {
            AicComparison::Defined(cmp) => Some(cmp.delta_aic),
            AicComparison::Undefined { .. } => None,
        }
    }
}

/// Everything the verdict needs from one resampling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceSummary {
    pub run: ResamplingRun,
    /// Samples that entered the distribution.
    pub recorded: usize,
    /// Null-hypothesis score; always `Undefined` for bootstrap.
    pub score: Score,
    pub p_value_empirical: Option<f64>,
    pub p_value_gaussian: Option<f64>,
    pub bootstrap: Option<BootstrapSummary>,
}

impl SignificanceSummary {
    pub fn from_null(observed: f64, null: &NullDistribution, config: &AuditConfig) -> Result<Self> {
        let score = significance(observed, null, config.std_convention)?;
        let p_value_gaussian = match score.value() {
            Some(z) => Some(gaussian_p_value(z)?),
            None => None,
        };
        Ok(Self {
            run: *null.run(),
            recorded: null.len(),
            score,
            p_value_empirical: empirical_p_value(observed, null),
            p_value_gaussian,
            bootstrap: None,
        })
    }

    pub fn from_bootstrap(dist: &BootstrapDistribution, config: &AuditConfig) -> Self {
        Self {
            run: *dist.run(),
            recorded: dist.len(),
            score: Score::Undefined {
                reason: "case resampling does not define a null-hypothesis score".to_string(),
            },
            p_value_empirical: None,
            p_value_gaussian: None,
            bootstrap: summarize_bootstrap(dist, config.confidence_level, config.std_convention),
        }
    }
}

/// Final, immutable audit outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub d0_final: f64,
    pub direction: Direction,
    pub z_score: Score,
    pub delta_aic: AicComparison,
    /// Observations used by the primary fit.
    pub n_samples: usize,
    pub convergence_failures: usize,
    pub strategy: Strategy,
    pub scaling: Scaling,
    pub iterations_requested: usize,
    pub iterations_recorded: usize,
    pub unreliable: bool,
    pub cancelled: bool,
    pub p_value_empirical: Option<f64>,
    pub p_value_gaussian: Option<f64>,
    pub bootstrap: Option<BootstrapSummary>,
    /// Solver iterations of the primary fit.
    pub fit_iterations: usize,
    pub fit_cost: f64,
}

/// Combine the primary fit, resampling summary and model comparison.
pub fn assemble_verdict(
    fit: &FitResult,
    significance: &SignificanceSummary,
    comparison: AicComparison,
    scaling: Scaling,
) -> AuditVerdict {
    AuditVerdict {
        d0_final: fit.parameters.amplitude,
        direction: Direction {
            longitude_deg: fit.parameters.longitude_deg(),
            latitude_deg: fit.parameters.latitude_deg(),
        },
        z_score: significance.score.clone(),
        delta_aic: comparison,
        n_samples: fit.weighted_residuals.len(),
        convergence_failures: significance.run.convergence_failures,
        strategy: significance.run.strategy,
        scaling,
        iterations_requested: significance.run.requested,
        iterations_recorded: significance.recorded,
        unreliable: significance.run.unreliable,
        cancelled: significance.run.cancelled,
        p_value_empirical: significance.p_value_empirical,
        p_value_gaussian: significance.p_value_gaussian,
        bootstrap: significance.bootstrap,
        fit_iterations: fit.iterations,
        fit_cost: fit.cost,
    }
}
