//! Significance scores and distribution summaries.
//!
//! - permutation: `z = (D_obs − mean(null)) / std(null)`, empirical and Gaussian p-values
//! - bootstrap: mean, standard error and percentile interval (no z-score)

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::StdConvention;
use crate::error::{AuditError, Result};
use crate::math::{mean, quantile_sorted, sorted, std_dev};
use crate::significance::estimator::{BootstrapDistribution, NullDistribution};

/// A significance score that may be undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Score {
    Defined { z: f64 },
    Undefined { reason: String },
}

impl Score {
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Defined { z } => Some(*z),
            Score::Undefined { .. } => None,
        }
    }
}

/// z-score of the observed amplitude against the permutation null.
///
/// Fails with `DegenerateNull` when the null has fewer than two samples or zero
/// spread.
pub fn z_score(observed: f64, null: &NullDistribution, convention: StdConvention) -> Result<f64> {
    let samples = null.amplitudes();
    let degenerate = |std: f64| AuditError::DegenerateNull { samples: samples.len(), std };
    if samples.len() < 2 {
        return Err(degenerate(0.0));
    }
    let (Some(m), Some(s)) = (mean(samples), std_dev(samples, convention)) else {
        return Err(degenerate(0.0));
    };
    if !(s.is_finite() && s > 0.0) {
        return Err(degenerate(s));
    }
    Ok((observed - m) / s)
}

/// Like [`z_score`], with a degenerate null mapped to `Score::Undefined`.
pub fn significance(observed: f64, null: &NullDistribution, convention: StdConvention) -> Result<Score> {
    match z_score(observed, null, convention) {
        Ok(z) => Ok(Score::Defined { z }),
        Err(e) if !e.is_fatal() => Ok(Score::Undefined { reason: e.to_string() }),
        Err(e) => Err(e),
    }
}

/// One-sided empirical p-value `(1 + #{null ≥ observed}) / (1 + K')`.
pub fn empirical_p_value(observed: f64, null: &NullDistribution) -> Option<f64> {
    if null.is_empty() {
        return None;
    }
    let exceed = null.amplitudes().iter().filter(|&&a| a >= observed).count();
    Some((1 + exceed) as f64 / (1 + null.len()) as f64)
}

/// One-sided Gaussian p-value `1 − Φ(z)`.
pub fn gaussian_p_value(z: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AuditError::invalid_input(format!("Normal distribution error: {e}")))?;
    Ok(normal.sf(z))
}

/// Sampling-variability summary of a bootstrap distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub samples: usize,
    pub mean: f64,
    pub standard_error: f64,
    pub confidence_level: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Mean, standard error and percentile interval; `None` with fewer than two samples.
pub fn summarize_bootstrap(
    dist: &BootstrapDistribution,
    confidence_level: f64,
    convention: StdConvention,
) -> Option<BootstrapSummary> {
    let values = dist.amplitudes();
    if values.len() < 2 {
        return None;
    }
    let alpha = (1.0 - confidence_level) / 2.0;
    let sorted = sorted(values);
    Some(BootstrapSummary {
        samples: values.len(),
        mean: mean(values)?,
        standard_error: std_dev(values, convention)?,
        confidence_level,
        lower: quantile_sorted(&sorted, alpha)?,
        upper: quantile_sorted(&sorted, 1.0 - alpha)?,
    })
}
