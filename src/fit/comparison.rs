//! Dipole vs isotropic model comparison using information criteria.
//!
//! Both models are scored on the same weighted residuals:
//! - dipole: `RSS = Σ [w_i (m_i − y_i)]²` from the fit (k = 3)
//! - isotropic: the zero model, `RSS = Σ (w_i y_i)²` with no fit (k = 0)
//!
//! ```text
//! AIC = 2k + n ln(RSS/n)
//! BIC = k ln n + n ln(RSS/n)
//! ```
//!
//! Deltas are `dipole − isotropic`, so a negative value favors the dipole.

use serde::{Deserialize, Serialize};

use crate::domain::{FitResult, ObservationSet};
use crate::error::{AuditError, Result};
use crate::models::DipoleModel;

/// Parameter count of the isotropic (zero) model.
const ISOTROPIC_PARAM_COUNT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub n: usize,
    pub rss_dipole: f64,
    pub rss_isotropic: f64,
    pub aic_dipole: f64,
    pub aic_isotropic: f64,
    /// `AIC_dipole − AIC_isotropic` (negative favors the dipole).
    pub delta_aic: f64,
    pub bic_dipole: f64,
    pub bic_isotropic: f64,
    /// `BIC_dipole − BIC_isotropic` (negative favors the dipole).
    pub delta_bic: f64,
}

/// Akaike information criterion for a Gaussian likelihood with unknown variance.
pub fn aic(rss: f64, n: usize, k: usize) -> f64 {
    let nf = n as f64;
    2.0 * k as f64 + nf * (rss / nf).ln()
}

/// Bayesian information criterion, same likelihood as [`aic`].
pub fn bic(rss: f64, n: usize, k: usize) -> f64 {
    let nf = n as f64;
    k as f64 * nf.ln() + nf * (rss / nf).ln()
}

/// Compare a dipole fit against the isotropic model on the same observations.
///
/// Fails with `DegenerateModelComparison` when there are no more observations
/// than dipole parameters, or when either RSS is not strictly positive. A
/// dipole RSS at rounding level relative to the isotropic RSS counts as zero.
pub fn compare_to_isotropic(observations: &ObservationSet, fit: &FitResult) -> Result<ModelComparison> {
    let n = observations.len();
    let k = DipoleModel::PARAM_COUNT;
    if n <= k {
        return Err(AuditError::DegenerateModelComparison {
            reason: format!("{n} observation(s) cannot constrain {k} dipole parameters"),
        });
    }
    if fit.weighted_residuals.len() != n {
        return Err(AuditError::invalid_input(format!(
            "Fit has {} residuals for {n} observations.",
            fit.weighted_residuals.len()
        )));
    }

    let rss_dipole = fit.cost;
    let rss_isotropic: f64 = observations
        .iter()
        .map(|o| {
            let r = o.weight * o.residual;
            r * r
        })
        .sum();

    for (label, rss) in [("dipole", rss_dipole), ("isotropic", rss_isotropic)] {
        if !(rss.is_finite() && rss > 0.0) {
            return Err(AuditError::DegenerateModelComparison {
                reason: format!("{label} RSS is {rss}"),
            });
        }
    }
    if rss_dipole <= f64::EPSILON * rss_isotropic {
        return Err(AuditError::DegenerateModelComparison {
            reason: format!("dipole RSS {rss_dipole:e} is at rounding level (exact interpolation)"),
        });
    }

    let aic_dipole = aic(rss_dipole, n, k);
    let aic_isotropic = aic(rss_isotropic, n, ISOTROPIC_PARAM_COUNT);
    let bic_dipole = bic(rss_dipole, n, k);
    let bic_isotropic = bic(rss_isotropic, n, ISOTROPIC_PARAM_COUNT);

    Ok(ModelComparison {
        n,
        rss_dipole,
        rss_isotropic,
        aic_dipole,
        aic_isotropic,
        delta_aic: aic_dipole - aic_isotropic,
        bic_dipole,
        bic_isotropic,
        delta_bic: bic_dipole - bic_isotropic,
    })
}
