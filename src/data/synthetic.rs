//! Seeded synthetic observation sets.
//!
//! Objects are drawn uniformly on the sphere (`lat = asin(u)`, `u ~ U[-1, 1]`),
//! with the independent variable uniform on `[x_min, x_max]`. Residuals are an
//! optional injected dipole plus Gaussian noise; weights are `1 / noise_sigma`.

use std::f64::consts::TAU;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::domain::{DipoleParameters, Observation, ObservationSet, Scaling};
use crate::error::{AuditError, Result};
use crate::models::DipoleModel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub n: usize,
    pub x_min: f64,
    pub x_max: f64,
    /// Gaussian noise standard deviation; `0` gives noiseless residuals.
    pub noise_sigma: f64,
    /// Injected dipole (`None` for pure noise).
    pub dipole: Option<DipoleParameters>,
    pub scaling: Scaling,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            n: 500,
            x_min: 0.05,
            x_max: 1.0,
            noise_sigma: 0.15,
            dipole: None,
            scaling: Scaling::Identity,
            seed: 42,
        }
    }
}

pub fn generate_observations(spec: &SyntheticSpec) -> Result<ObservationSet> {
    if spec.n == 0 {
        return Err(AuditError::invalid_input("Sample count must be > 0."));
    }
    if !(spec.x_min.is_finite() && spec.x_max.is_finite() && spec.x_max > spec.x_min) {
        return Err(AuditError::invalid_input("Invalid independent-variable range for sample generation."));
    }
    if !(spec.noise_sigma.is_finite() && spec.noise_sigma >= 0.0) {
        return Err(AuditError::invalid_input("Noise sigma must be finite and >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let lon_dist = Uniform::new(0.0, TAU);
    let u_dist = Uniform::new_inclusive(-1.0, 1.0);
    let x_dist = Uniform::new_inclusive(spec.x_min, spec.x_max);
    let noise = Normal::new(0.0, spec.noise_sigma)
        .map_err(|e| AuditError::invalid_input(format!("Noise distribution error: {e}")))?;

    let model = DipoleModel::new(spec.scaling);
    let weight = if spec.noise_sigma > 0.0 { 1.0 / spec.noise_sigma } else { 1.0 };

    let observations = (0..spec.n)
        .map(|_| {
            let x = x_dist.sample(&mut rng);
            let lon = lon_dist.sample(&mut rng);
            let lat = f64::asin(u_dist.sample(&mut rng));
            let signal = spec.dipole.map_or(0.0, |p| model.predict_at(&p, x, lon, lat));
            let eps = if spec.noise_sigma > 0.0 { noise.sample(&mut rng) } else { 0.0 };
            Observation {
                independent_var: x,
                longitude: lon,
                latitude: lat,
                residual: signal + eps,
                weight,
            }
        })
        .collect();

    ObservationSet::new(observations)
}
