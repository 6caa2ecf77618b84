//! Resampling loops: permutation null and bootstrap distribution.
//!
//! Both loops refit the dipole `K` times on resampled copies of the
//! observations and record the fitted amplitude.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ iteration i                                   │
//! │   cancelled? ──► skip (not a failure)         │
//! │   rng_i = iteration_rng(seed, i)              │
//! │   draw resampled set with rng_i               │
//! │   refit ──► converged? record D0 : count fail │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Iterations are independent, so the rayon and sequential paths produce the
//! same ordered amplitudes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{AuditConfig, ObservationSet, Strategy};
use crate::error::{AuditError, Result};
use crate::fit::fit_dipole;
use crate::models::DipoleModel;
use crate::significance::resample::{bootstrap_sample, iteration_rng, permute_residuals};

/// Cooperative cancellation flag shared with a running resampling loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bookkeeping for one resampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResamplingRun {
    pub strategy: Strategy,
    /// Requested iterations `K`.
    pub requested: usize,
    /// Iterations that ran (not skipped by cancellation).
    pub attempted: usize,
    pub convergence_failures: usize,
    pub cancelled: bool,
    /// `convergence_failures / attempted` exceeded the configured threshold.
    pub unreliable: bool,
}

impl ResamplingRun {
    pub fn failure_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.convergence_failures as f64 / self.attempted as f64
    }
}

/// Amplitudes refitted under label permutation (the no-dipole null).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullDistribution {
    amplitudes: Vec<f64>,
    run: ResamplingRun,
}

/// Amplitudes refitted under case resampling (sampling variability, not a null).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapDistribution {
    amplitudes: Vec<f64>,
    run: ResamplingRun,
}

macro_rules! distribution_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Recorded amplitudes in iteration order.
            pub fn amplitudes(&self) -> &[f64] {
                &self.amplitudes
            }

            pub fn len(&self) -> usize {
                self.amplitudes.len()
            }

            pub fn is_empty(&self) -> bool {
                self.amplitudes.is_empty()
            }

            pub fn run(&self) -> &ResamplingRun {
                &self.run
            }
        }
    };
}

distribution_accessors!(NullDistribution);
distribution_accessors!(BootstrapDistribution);

/// Outcome of one iteration.
enum Outcome {
    Recorded(f64),
    Failed,
    Skipped,
}

/// Build the null distribution by permuting residuals across objects.
pub fn permutation_null(
    observations: &ObservationSet,
    config: &AuditConfig,
    cancel: &CancelToken,
) -> Result<NullDistribution> {
    let (amplitudes, run) =
        run_resampling(observations, config, cancel, Strategy::Permutation, permute_residuals)?;
    Ok(NullDistribution { amplitudes, run })
}

/// Build the bootstrap distribution by drawing observations with replacement.
pub fn bootstrap_distribution(
    observations: &ObservationSet,
    config: &AuditConfig,
    cancel: &CancelToken,
) -> Result<BootstrapDistribution> {
    let (amplitudes, run) =
        run_resampling(observations, config, cancel, Strategy::Bootstrap, bootstrap_sample)?;
    Ok(BootstrapDistribution { amplitudes, run })
}

fn run_resampling<F>(
    observations: &ObservationSet,
    config: &AuditConfig,
    cancel: &CancelToken,
    strategy: Strategy,
    draw: F,
) -> Result<(Vec<f64>, ResamplingRun)>
where
    F: Fn(&ObservationSet, &mut StdRng) -> ObservationSet + Sync,
{
    if observations.is_empty() {
        return Err(AuditError::InsufficientData { available: 0, required: 1 });
    }
    let model = DipoleModel::new(config.scaling);
    let k = config.iterations;

    info!(
        strategy = strategy.display_name(),
        iterations = k,
        n = observations.len(),
        parallel = config.parallel,
        "resampling started"
    );

    let iteration = |i: usize| -> Result<Outcome> {
        if cancel.is_cancelled() {
            return Ok(Outcome::Skipped);
        }
        let mut rng = iteration_rng(config.seed, i as u64);
        let resampled = draw(observations, &mut rng);
        let fit = fit_dipole(&resampled, &model, &config.initial_guess, &config.bounds, &config.fit)?;
        if fit.converged {
            Ok(Outcome::Recorded(fit.parameters.amplitude))
        } else {
            debug!(iteration = i, iterations = fit.iterations, "refit did not converge");
            Ok(Outcome::Failed)
        }
    };

    let outcomes: Vec<Result<Outcome>> = if config.parallel {
        (0..k).into_par_iter().map(iteration).collect()
    } else {
        (0..k).map(iteration).collect()
    };

    let mut amplitudes = Vec::with_capacity(k);
    let mut attempted = 0;
    let mut convergence_failures = 0;
    for outcome in outcomes {
        match outcome? {
            Outcome::Recorded(a) => {
                attempted += 1;
                amplitudes.push(a);
            }
            Outcome::Failed => {
                attempted += 1;
                convergence_failures += 1;
            }
            Outcome::Skipped => {}
        }
    }

    let cancelled = attempted < k;
    let mut run = ResamplingRun {
        strategy,
        requested: k,
        attempted,
        convergence_failures,
        cancelled,
        unreliable: false,
    };
    run.unreliable = run.failure_rate() > config.unreliable_threshold;

    if run.unreliable {
        warn!(
            strategy = strategy.display_name(),
            failures = convergence_failures,
            attempted,
            threshold = config.unreliable_threshold,
            "resampling marked unreliable"
        );
    }
    if cancelled {
        warn!(attempted, requested = k, "resampling cancelled");
    }
    info!(
        strategy = strategy.display_name(),
        recorded = amplitudes.len(),
        failures = convergence_failures,
        "resampling finished"
    );

    Ok((amplitudes, run))
}
