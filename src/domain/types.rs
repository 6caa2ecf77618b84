//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and resampling
//! - exported to JSON/CSV alongside a verdict
//! - built directly from CLI flags (`ValueEnum` derives)

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::fit::FitOptions;
use crate::math::wrap_longitude;

/// Tolerance used when checking that latitudes lie on the sphere.
const LAT_EPS: f64 = 1e-12;

/// How the anisotropy scales with the independent variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// `g(x) = x`: the effect grows linearly with the independent variable.
    Identity,
    /// `g(x) = 1`: a fixed per-object offset.
    Constant,
}

impl Scaling {
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Scaling::Identity => x,
            Scaling::Constant => 1.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Scaling::Identity => "g(x) = x",
            Scaling::Constant => "g(x) = 1",
        }
    }
}

/// Resampling strategy.
///
/// The two strategies answer different questions and are never interchangeable:
/// permutation builds a null distribution (is the signal surprising?), bootstrap
/// estimates the sampling variability of the fitted amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Label permutation of residuals (null-hypothesis test).
    Permutation,
    /// Case resampling with replacement (sampling variability).
    Bootstrap,
}

impl Strategy {
    pub fn display_name(self) -> &'static str {
        match self {
            Strategy::Permutation => "label permutation (null hypothesis)",
            Strategy::Bootstrap => "case resampling (bootstrap)",
        }
    }
}

/// Standard deviation convention for resampled distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StdConvention {
    /// Divide by `n` (no Bessel correction).
    Population,
    /// Divide by `n - 1` (Bessel correction).
    Sample,
}

impl StdConvention {
    /// Delta degrees of freedom.
    pub fn ddof(self) -> usize {
        match self {
            StdConvention::Population => 0,
            StdConvention::Sample => 1,
        }
    }
}

/// A single object on the sky.
///
/// Angles are radians. `longitude` is normalised to `[0, 2π)` on construction
/// through [`ObservationSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub independent_var: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub residual: f64,
    pub weight: f64,
}

/// An ordered, immutable set of observations.
///
/// Weights are *not* validated here; the fitter rejects non-positive or
/// non-finite weights with [`AuditError::InvalidWeight`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    /// Build a set from observations, checking finiteness and latitude range.
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        let mut out = Vec::with_capacity(observations.len());
        for (i, mut o) in observations.into_iter().enumerate() {
            if !(o.independent_var.is_finite()
                && o.longitude.is_finite()
                && o.latitude.is_finite()
                && o.residual.is_finite())
            {
                return Err(AuditError::invalid_input(format!(
                    "Observation {i} has a non-finite field."
                )));
            }
            if o.latitude.abs() > FRAC_PI_2 + LAT_EPS {
                return Err(AuditError::invalid_input(format!(
                    "Observation {i} latitude {} rad is outside [-π/2, π/2].",
                    o.latitude
                )));
            }
            o.latitude = o.latitude.clamp(-FRAC_PI_2, FRAC_PI_2);
            o.longitude = wrap_longitude(o.longitude);
            out.push(o);
        }
        Ok(Self { observations: out })
    }

    /// Build a set from the column-oriented input contract.
    ///
    /// `weight = None` means uniform weights of 1.
    pub fn from_columns(
        independent_var: &[f64],
        longitude: &[f64],
        latitude: &[f64],
        residual: &[f64],
        weight: Option<&[f64]>,
    ) -> Result<Self> {
        let n = independent_var.len();
        let lengths = [longitude.len(), latitude.len(), residual.len()];
        if lengths.iter().any(|&len| len != n) || weight.is_some_and(|w| w.len() != n) {
            return Err(AuditError::invalid_input(format!(
                "Column length mismatch: x={n}, lon={}, lat={}, residual={}, weight={}",
                longitude.len(),
                latitude.len(),
                residual.len(),
                weight.map_or(n, <[f64]>::len),
            )));
        }

        let observations = (0..n)
            .map(|i| Observation {
                independent_var: independent_var[i],
                longitude: longitude[i],
                latitude: latitude[i],
                residual: residual[i],
                weight: weight.map_or(1.0, |w| w[i]),
            })
            .collect();
        Self::new(observations)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn residuals(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.residual).collect()
    }

    /// Keep observations whose independent variable is strictly above `cutoff`.
    pub fn above_cutoff(&self, cutoff: f64) -> Self {
        Self {
            observations: self
                .observations
                .iter()
                .filter(|o| o.independent_var > cutoff)
                .copied()
                .collect(),
        }
    }

    /// Remove the (unweighted) mean residual, the isotropic baseline.
    pub fn centered(&self) -> Self {
        if self.observations.is_empty() {
            return self.clone();
        }
        let mean = self.observations.iter().map(|o| o.residual).sum::<f64>()
            / self.observations.len() as f64;
        Self {
            observations: self
                .observations
                .iter()
                .map(|o| Observation { residual: o.residual - mean, ..*o })
                .collect(),
        }
    }

    /// Copy with the residual column replaced (positions and weights unchanged).
    pub(crate) fn with_residuals(&self, residuals: &[f64]) -> Self {
        debug_assert_eq!(residuals.len(), self.observations.len());
        Self {
            observations: self
                .observations
                .iter()
                .zip(residuals)
                .map(|(o, &residual)| Observation { residual, ..*o })
                .collect(),
        }
    }

    /// Copy made of the full tuples at `indices` (repeats allowed).
    pub(crate) fn select(&self, indices: &[usize]) -> Self {
        Self {
            observations: indices.iter().map(|&i| self.observations[i]).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ObservationSet {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Dipole amplitude and direction (radians).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipoleParameters {
    pub amplitude: f64,
    pub longitude: f64,
    pub latitude: f64,
}

impl DipoleParameters {
    pub fn new(amplitude: f64, longitude: f64, latitude: f64) -> Self {
        Self { amplitude, longitude, latitude }
    }

    /// Build from a direction given in degrees.
    pub fn from_degrees(amplitude: f64, longitude_deg: f64, latitude_deg: f64) -> Self {
        Self::new(amplitude, longitude_deg.to_radians(), latitude_deg.to_radians())
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude.to_degrees()
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude.to_degrees()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.amplitude, self.longitude, self.latitude]
    }

    pub fn from_array(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Box bounds on `(amplitude, longitude, latitude)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            lower: [0.0, 0.0, -FRAC_PI_2],
            upper: [2.0, TAU, FRAC_PI_2],
        }
    }
}

impl ParameterBounds {
    /// Bounds with a custom amplitude ceiling and the full sphere for direction.
    pub fn with_max_amplitude(max_amplitude: f64) -> Self {
        Self {
            upper: [max_amplitude, TAU, FRAC_PI_2],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for i in 0..3 {
            let (lo, hi) = (self.lower[i], self.upper[i]);
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(AuditError::invalid_input(format!(
                    "Invalid bounds for parameter {i}: [{lo}, {hi}]"
                )));
            }
        }
        if self.lower[0] < 0.0 {
            return Err(AuditError::invalid_input("Amplitude lower bound must be >= 0."));
        }
        if self.lower[2] < -FRAC_PI_2 - LAT_EPS || self.upper[2] > FRAC_PI_2 + LAT_EPS {
            return Err(AuditError::invalid_input("Latitude bounds must lie within [-π/2, π/2]."));
        }
        if self.upper[1] - self.lower[1] > TAU + LAT_EPS {
            return Err(AuditError::invalid_input("Longitude bounds span more than 2π."));
        }
        Ok(())
    }

    /// True when the longitude range covers the whole circle and is treated as periodic.
    pub fn longitude_is_periodic(&self) -> bool {
        self.upper[1] - self.lower[1] >= TAU - 1e-9
    }

    pub fn contains(&self, p: &DipoleParameters) -> bool {
        p.to_array()
            .iter()
            .enumerate()
            .all(|(i, &v)| v >= self.lower[i] && v <= self.upper[i])
    }

    /// Project a point into the box (longitude wraps when periodic).
    pub fn project(&self, p: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for i in 0..3 {
            out[i] = p[i].clamp(self.lower[i], self.upper[i]);
        }
        if self.longitude_is_periodic() {
            let span = self.upper[1] - self.lower[1];
            let mut lon = self.lower[1] + (p[1] - self.lower[1]).rem_euclid(span);
            // rem_euclid can round up to `span` for tiny negative inputs.
            if lon >= self.upper[1] {
                lon = self.lower[1];
            }
            out[1] = lon;
        }
        out
    }
}

/// Output of a single bounded fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub parameters: DipoleParameters,
    /// `weight_i * (model_i - residual_i)`, in observation order.
    pub weighted_residuals: Vec<f64>,
    /// Sum of squared weighted residuals.
    pub cost: f64,
    pub converged: bool,
    /// Solver iterations used by the winning start.
    pub iterations: usize,
}

/// A full audit run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults) or built directly by library callers.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Keep observations with `independent_var > cutoff` (`None` disables the cut).
    pub cutoff: Option<f64>,
    /// Number of resampling iterations `K`.
    pub iterations: usize,
    pub initial_guess: DipoleParameters,
    pub bounds: ParameterBounds,
    pub scaling: Scaling,
    pub strategy: Strategy,
    pub seed: u64,
    pub std_convention: StdConvention,
    /// Fraction of non-convergent iterations above which the result is unreliable.
    pub unreliable_threshold: f64,
    /// Confidence level for bootstrap percentile intervals.
    pub confidence_level: f64,
    /// Run resampling iterations on the rayon pool.
    pub parallel: bool,
    /// Minimum sample size after filtering.
    pub min_observations: usize,
    pub fit: FitOptions,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            cutoff: Some(0.02),
            iterations: 100,
            initial_guess: DipoleParameters::from_degrees(0.1, 148.0, -5.0),
            bounds: ParameterBounds::default(),
            scaling: Scaling::Identity,
            strategy: Strategy::Permutation,
            seed: 42,
            std_convention: StdConvention::Population,
            unreliable_threshold: 0.2,
            confidence_level: 0.95,
            parallel: false,
            min_observations: 8,
            fit: FitOptions::default(),
        }
    }
}

impl AuditConfig {
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        if self.iterations == 0 {
            return Err(AuditError::invalid_input("Resampling iterations must be > 0."));
        }
        if !(self.unreliable_threshold.is_finite() && (0.0..=1.0).contains(&self.unreliable_threshold)) {
            return Err(AuditError::invalid_input("Unreliable threshold must be in [0, 1]."));
        }
        if !(self.confidence_level.is_finite()
            && self.confidence_level > 0.0
            && self.confidence_level < 1.0)
        {
            return Err(AuditError::invalid_input("Confidence level must be in (0, 1)."));
        }
        if let Some(cutoff) = self.cutoff {
            if !cutoff.is_finite() {
                return Err(AuditError::invalid_input("Cutoff must be finite."));
            }
        }
        if self.min_observations == 0 {
            return Err(AuditError::invalid_input("Minimum sample size must be > 0."));
        }
        let guess = self.initial_guess.to_array();
        if guess.iter().any(|v| !v.is_finite()) {
            return Err(AuditError::invalid_input("Initial guess must be finite."));
        }
        if !(guess[2].abs() <= FRAC_PI_2 + LAT_EPS && guess[1].abs() <= 2.0 * PI + LAT_EPS) {
            return Err(AuditError::invalid_input(
                "Initial guess direction must be within longitude [0, 2π) and latitude [-π/2, π/2].",
            ));
        }
        self.fit.validate()
    }
}
