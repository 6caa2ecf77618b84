//! Dipole model evaluation.
//!
//! The fitter relies on three primitive operations:
//! - predict the residual for an observation given `(D0, l_p, b_p)`
//! - the analytic Jacobian row with respect to `(D0, l_p, b_p)` (for LM steps)
//! - a linear design row in Cartesian dipole components (for the linear seed)
//!
//! The fitter precomputes the design row `g(x) · r̂` once per observation and
//! evaluates predictions and Jacobians from it through `DipoleAxis`.
//!
//! The prediction is
//!
//! ```text
//! m(x, l, b) = D0 · g(x) · cos θ
//! cos θ      = sin b sin b_p + cos b cos b_p cos(l − l_p)
//! ```

use crate::domain::{DipoleParameters, Observation, Scaling};
use crate::math::{cos_separation, unit_vector};

/// A dipole model with a fixed scaling `g(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DipoleModel {
    pub scaling: Scaling,
}

impl DipoleModel {
    /// Parameter count used by information criteria.
    pub const PARAM_COUNT: usize = 3;

    pub fn new(scaling: Scaling) -> Self {
        Self { scaling }
    }

    /// Predicted residual at `(x, l, b)`.
    #[inline]
    pub fn predict_at(&self, p: &DipoleParameters, x: f64, l: f64, b: f64) -> f64 {
        p.amplitude * self.scaling.apply(x) * cos_separation(l, b, p.longitude, p.latitude)
    }

    /// Predicted residual for an observation.
    #[inline]
    pub fn predict(&self, p: &DipoleParameters, o: &Observation) -> f64 {
        self.predict_at(p, o.independent_var, o.longitude, o.latitude)
    }

    /// Partial derivatives of the prediction with respect to `(D0, l_p, b_p)`.
    pub fn jacobian_row(&self, p: &DipoleParameters, x: f64, l: f64, b: f64) -> [f64; 3] {
        let axis = DipoleAxis::at(p.longitude, p.latitude);
        Self::design_jacobian(&axis, p.amplitude, &self.cartesian_row(x, l, b))
    }

    /// Design row for the Cartesian form `m = g(x) · (d · r̂)` with `d = D0 · n̂`.
    ///
    /// The model is linear in `d`, which gives the fitter a closed-form seed.
    pub fn cartesian_row(&self, x: f64, l: f64, b: f64) -> [f64; 3] {
        let g = self.scaling.apply(x);
        let r = unit_vector(l, b);
        [g * r[0], g * r[1], g * r[2]]
    }

    /// Prediction from a precomputed design row.
    #[inline]
    pub fn design_predict(axis: &DipoleAxis, amplitude: f64, design: &[f64; 3]) -> f64 {
        amplitude * dot(design, &axis.n_hat)
    }

    /// Jacobian from a precomputed design row.
    #[inline]
    pub fn design_jacobian(axis: &DipoleAxis, amplitude: f64, design: &[f64; 3]) -> [f64; 3] {
        [
            dot(design, &axis.n_hat),
            amplitude * dot(design, &axis.dn_dl),
            amplitude * dot(design, &axis.dn_db),
        ]
    }
}

/// Dipole direction `n̂(l_p, b_p)` and its partial derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DipoleAxis {
    pub n_hat: [f64; 3],
    pub dn_dl: [f64; 3],
    pub dn_db: [f64; 3],
}

impl DipoleAxis {
    pub fn at(longitude: f64, latitude: f64) -> Self {
        let (sin_l, cos_l) = longitude.sin_cos();
        let (sin_b, cos_b) = latitude.sin_cos();
        Self {
            n_hat: [cos_b * cos_l, cos_b * sin_l, sin_b],
            dn_dl: [-cos_b * sin_l, cos_b * cos_l, 0.0],
            dn_db: [-sin_b * cos_l, -sin_b * sin_l, cos_b],
        }
    }
}

#[inline]
fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DipoleModel {
        DipoleModel::new(Scaling::Identity)
    }

    #[test]
    fn prediction_is_maximal_along_the_dipole_axis() {
        let p = DipoleParameters::from_degrees(0.1, 150.0, -5.0);
        let on_axis = model().predict_at(&p, 0.5, p.longitude, p.latitude);
        let opposite = model().predict_at(&p, 0.5, p.longitude + std::f64::consts::PI, -p.latitude);
        assert!((on_axis - 0.05).abs() < 1e-12);
        assert!((opposite + 0.05).abs() < 1e-12);
    }

    #[test]
    fn constant_scaling_ignores_independent_variable() {
        let p = DipoleParameters::from_degrees(0.3, 10.0, 20.0);
        let m = DipoleModel::new(Scaling::Constant);
        let a = m.predict_at(&p, 0.1, 1.0, 0.2);
        let b = m.predict_at(&p, 5.0, 1.0, 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_amplitude_predicts_zero_everywhere() {
        let p = DipoleParameters::new(0.0, 1.0, 0.3);
        for &(l, b) in &[(0.0, 0.0), (3.0, -1.2), (6.0, 1.5)] {
            assert_eq!(model().predict_at(&p, 0.7, l, b), 0.0);
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let p = DipoleParameters::new(0.4, 2.1, -0.3);
        let (x, l, b) = (0.8, 0.7, 0.45);
        let row = model().jacobian_row(&p, x, l, b);

        let h = 1e-6;
        let base = p.to_array();
        for k in 0..3 {
            let mut up = base;
            let mut dn = base;
            up[k] += h;
            dn[k] -= h;
            let fd = (model().predict_at(&DipoleParameters::from_array(up), x, l, b)
                - model().predict_at(&DipoleParameters::from_array(dn), x, l, b))
                / (2.0 * h);
            assert!((fd - row[k]).abs() < 1e-8, "param {k}: fd={fd} analytic={}", row[k]);
        }
    }

    #[test]
    fn cartesian_row_reproduces_prediction() {
        let p = DipoleParameters::new(0.25, 4.0, 0.6);
        let (x, l, b) = (0.3, 1.1, -0.2);
        let n = unit_vector(p.longitude, p.latitude);
        let row = model().cartesian_row(x, l, b);
        let linear: f64 = (0..3).map(|k| row[k] * p.amplitude * n[k]).sum();
        assert!((linear - model().predict_at(&p, x, l, b)).abs() < 1e-12);
    }

    #[test]
    fn design_prediction_matches_direct_prediction() {
        let p = DipoleParameters::new(0.25, 4.0, 0.6);
        let axis = DipoleAxis::at(p.longitude, p.latitude);
        for &(x, l, b) in &[(0.3, 1.1, -0.2), (0.9, 5.5, 1.3), (0.05, 0.0, 0.0)] {
            let design = model().cartesian_row(x, l, b);
            let via_design = DipoleModel::design_predict(&axis, p.amplitude, &design);
            assert!((via_design - model().predict_at(&p, x, l, b)).abs() < 1e-12);
        }
    }
}
