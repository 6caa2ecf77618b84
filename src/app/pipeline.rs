//! The audit pipeline shared by the CLI and library callers.
//!
//! filter -> primary fit -> model comparison -> resampling -> verdict
//!
//! This is the one place where degenerate statistics are turned into explicit
//! `Undefined` verdict states; every other error propagates.

use tracing::{info, warn};

use crate::domain::{AuditConfig, FitResult, ObservationSet, Strategy};
use crate::error::{AuditError, Result};
use crate::fit::{compare_to_isotropic, fit_dipole};
use crate::models::DipoleModel;
use crate::report::{AicComparison, AuditVerdict, SignificanceSummary, assemble_verdict};
use crate::significance::{
    BootstrapDistribution, CancelToken, NullDistribution, Score, bootstrap_distribution, permutation_null,
};

/// The distribution produced by the configured strategy.
#[derive(Debug, Clone)]
pub enum Resampled {
    Null(NullDistribution),
    Bootstrap(BootstrapDistribution),
}

impl Resampled {
    pub fn strategy(&self) -> Strategy {
        match self {
            Resampled::Null(_) => Strategy::Permutation,
            Resampled::Bootstrap(_) => Strategy::Bootstrap,
        }
    }

    pub fn amplitudes(&self) -> &[f64] {
        match self {
            Resampled::Null(d) => d.amplitudes(),
            Resampled::Bootstrap(d) => d.amplitudes(),
        }
    }
}

/// All computed outputs of one audit.
#[derive(Debug, Clone)]
pub struct AuditOutput {
    pub verdict: AuditVerdict,
    pub fit: FitResult,
    pub resampled: Resampled,
}

/// Run a full audit.
pub fn run_audit(observations: &ObservationSet, config: &AuditConfig) -> Result<AuditOutput> {
    run_audit_with_cancel(observations, config, &CancelToken::new())
}

/// Run a full audit that can be cancelled from another thread.
pub fn run_audit_with_cancel(
    observations: &ObservationSet,
    config: &AuditConfig,
    cancel: &CancelToken,
) -> Result<AuditOutput> {
    config.validate()?;

    // 1) Keep objects strictly above the cutoff.
    let filtered = match config.cutoff {
        Some(c) => observations.above_cutoff(c),
        None => observations.clone(),
    };
    info!(
        total = observations.len(),
        kept = filtered.len(),
        cutoff = ?config.cutoff,
        "observations filtered"
    );
    if filtered.len() < config.min_observations {
        return Err(AuditError::InsufficientData {
            available: filtered.len(),
            required: config.min_observations,
        });
    }

    // 2) Primary fit; non-convergence here is fatal.
    let model = DipoleModel::new(config.scaling);
    let fit = fit_dipole(&filtered, &model, &config.initial_guess, &config.bounds, &config.fit)?;
    if !fit.converged {
        return Err(AuditError::NonConvergence { iterations: fit.iterations });
    }
    info!(
        amplitude = fit.parameters.amplitude,
        lon_deg = fit.parameters.longitude_deg(),
        lat_deg = fit.parameters.latitude_deg(),
        cost = fit.cost,
        "primary fit converged"
    );

    // 3) Dipole vs isotropic.
    let comparison = AicComparison::from_result(compare_to_isotropic(&filtered, &fit))?;
    if let AicComparison::Undefined { reason } = &comparison {
        warn!(%reason, "model comparison undefined");
    }

    // 4) Resampling.
    let observed = fit.parameters.amplitude;
    let (summary, resampled) = match config.strategy {
        Strategy::Permutation => {
            let null = permutation_null(&filtered, config, cancel)?;
            let summary = SignificanceSummary::from_null(observed, &null, config)?;
            (summary, Resampled::Null(null))
        }
        Strategy::Bootstrap => {
            let dist = bootstrap_distribution(&filtered, config, cancel)?;
            let summary = SignificanceSummary::from_bootstrap(&dist, config);
            (summary, Resampled::Bootstrap(dist))
        }
    };
    if config.strategy == Strategy::Permutation {
        if let Score::Undefined { reason } = &summary.score {
            warn!(%reason, "significance undefined");
        }
    }

    // 5) Verdict.
    let verdict = assemble_verdict(&fit, &summary, comparison, config.scaling);
    Ok(AuditOutput { verdict, fit, resampled })
}
