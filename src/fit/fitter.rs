//! Bounded nonlinear least squares for the dipole model.
//!
//! Given:
//! - observations `(x_i, l_i, b_i, y_i, w_i)`
//! - a dipole model with scaling `g`
//! - an initial guess and box bounds on `(D0, l_p, b_p)`
//!
//! we minimize `Σ [w_i (m(p; x_i, l_i, b_i) − y_i)]²` with a projected
//! Levenberg–Marquardt iteration:
//!
//! - damped normal equations `(JᵀJ + λ diag(JᵀJ)) δ = −Jᵀr`
//! - components sitting on a bound with the gradient pointing outward are frozen
//! - trial points are projected back into the box (longitude wraps when the
//!   bounds cover the full circle)
//! - accepted steps shrink `λ`, rejected steps grow it
//!
//! Because the prediction is linear in the Cartesian vector `d = D0 · n̂`, we can
//! also solve the unconstrained problem in closed form and use it as a second
//! starting point. The lower-cost start wins; the caller's guess is always tried.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DipoleParameters, FitResult, ObservationSet, ParameterBounds};
use crate::error::{AuditError, Result};
use crate::math::{from_cartesian, solve_least_squares, solve_symmetric};
use crate::models::{DipoleAxis, DipoleModel};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
/// Floor on the Marquardt diagonal, relative to its largest entry.
const DIAG_FLOOR: f64 = 1e-12;

/// Options that control a single bounded solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Outer LM iteration budget per start.
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size below which the solve counts as converged.
    pub xtol: f64,
    /// Projected-gradient tolerance (scaled by `1 + cost`).
    pub gtol: f64,
    /// Also start from the closed-form Cartesian solution.
    pub linear_seed: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            linear_seed: true,
        }
    }
}

impl FitOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AuditError::invalid_input("Fit iteration budget must be > 0."));
        }
        for (name, v) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AuditError::invalid_input(format!("Invalid {name}: {v}")));
            }
        }
        Ok(())
    }
}

/// Fit the dipole model to an observation set.
///
/// Never fails on non-convergence: the best parameters found are returned with
/// `converged = false` and the caller decides what to do with them.
pub fn fit_dipole(
    observations: &ObservationSet,
    model: &DipoleModel,
    initial_guess: &DipoleParameters,
    bounds: &ParameterBounds,
    opts: &FitOptions,
) -> Result<FitResult> {
    if observations.is_empty() {
        return Err(AuditError::InsufficientData { available: 0, required: 1 });
    }
    if let Some((index, o)) = observations
        .iter()
        .enumerate()
        .find(|(_, o)| !(o.weight.is_finite() && o.weight > 0.0))
    {
        return Err(AuditError::InvalidWeight { index, value: o.weight });
    }

    let problem = Problem::new(observations, model);

    let mut best = levenberg_marquardt(&problem, initial_guess.to_array(), bounds, opts);
    if opts.linear_seed {
        if let Some(seed) = problem.linear_seed(initial_guess) {
            let candidate = levenberg_marquardt(&problem, seed, bounds, opts);
            // Deterministic selection: strictly lower cost replaces the caller's start.
            if candidate.cost < best.cost {
                best = candidate;
            }
        }
    }

    let (weighted_residuals, cost) = problem.evaluate(&best.params);
    debug!(
        amplitude = best.params[0],
        cost,
        iterations = best.iterations,
        converged = best.converged,
        "dipole fit finished"
    );

    Ok(FitResult {
        parameters: DipoleParameters::from_array(best.params),
        weighted_residuals,
        cost,
        converged: best.converged,
        iterations: best.iterations,
    })
}

/// Per-observation quantities that do not depend on the parameters.
#[derive(Debug, Clone)]
struct Row {
    /// Cartesian design row `g(x) · r̂`.
    design: [f64; 3],
    w: f64,
    y: f64,
}

struct Problem {
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct Solve {
    params: [f64; 3],
    cost: f64,
    converged: bool,
    iterations: usize,
}

impl Problem {
    fn new(observations: &ObservationSet, model: &DipoleModel) -> Self {
        let rows = observations
            .iter()
            .map(|o| Row {
                design: model.cartesian_row(o.independent_var, o.longitude, o.latitude),
                w: o.weight,
                y: o.residual,
            })
            .collect();
        Self { rows }
    }

    /// Weighted residual vector and its sum of squares.
    fn evaluate(&self, p: &[f64; 3]) -> (Vec<f64>, f64) {
        let axis = DipoleAxis::at(p[1], p[2]);
        let mut cost = 0.0;
        let residuals = self
            .rows
            .iter()
            .map(|row| {
                let m = DipoleModel::design_predict(&axis, p[0], &row.design);
                let r = row.w * (m - row.y);
                cost += r * r;
                r
            })
            .collect();
        (residuals, cost)
    }

    fn cost(&self, p: &[f64; 3]) -> f64 {
        let axis = DipoleAxis::at(p[1], p[2]);
        self.rows
            .iter()
            .map(|row| {
                let r = row.w * (DipoleModel::design_predict(&axis, p[0], &row.design) - row.y);
                r * r
            })
            .sum()
    }

    /// Weighted Jacobian row `w_i ∂m_i/∂p`.
    fn jacobian_row(&self, row: &Row, p: &[f64; 3], axis: &DipoleAxis) -> [f64; 3] {
        DipoleModel::design_jacobian(axis, p[0], &row.design).map(|d| row.w * d)
    }

    /// `JᵀJ` and `Jᵀr` at `p`.
    fn normal_equations(&self, p: &[f64; 3], residuals: &[f64]) -> ([[f64; 3]; 3], [f64; 3]) {
        let axis = DipoleAxis::at(p[1], p[2]);
        let mut jtj = [[0.0; 3]; 3];
        let mut jtr = [0.0; 3];
        for (row, &r) in self.rows.iter().zip(residuals) {
            let j = self.jacobian_row(row, p, &axis);
            for a in 0..3 {
                jtr[a] += j[a] * r;
                for b in a..3 {
                    jtj[a][b] += j[a] * j[b];
                }
            }
        }
        for a in 0..3 {
            for b in 0..a {
                jtj[a][b] = jtj[b][a];
            }
        }
        (jtj, jtr)
    }

    /// Closed-form start from the Cartesian linear problem.
    fn linear_seed(&self, fallback: &DipoleParameters) -> Option<[f64; 3]> {
        let n = self.rows.len();
        let mut x = DMatrix::<f64>::zeros(n, 3);
        let mut y = DVector::<f64>::zeros(n);
        for (i, row) in self.rows.iter().enumerate() {
            for k in 0..3 {
                x[(i, k)] = row.w * row.design[k];
            }
            y[i] = row.w * row.y;
        }
        let d = solve_least_squares(&x, &y)?;
        let (norm, lon, lat) = from_cartesian([d[0], d[1], d[2]]);
        if norm == 0.0 {
            return Some([0.0, fallback.longitude, fallback.latitude]);
        }
        Some([norm, lon, lat])
    }
}

fn levenberg_marquardt(
    problem: &Problem,
    start: [f64; 3],
    bounds: &ParameterBounds,
    opts: &FitOptions,
) -> Solve {
    let mut p = bounds.project(start);
    let (mut residuals, mut cost) = problem.evaluate(&p);
    let mut lambda = LAMBDA_INIT;

    if !cost.is_finite() {
        return Solve { params: p, cost, converged: false, iterations: 0 };
    }

    for iteration in 1..=opts.max_iterations {
        let (jtj, jtr) = problem.normal_equations(&p, &residuals);

        // Freeze components pinned on a bound with the gradient pushing outward.
        let mut active = [false; 3];
        let mut pg_inf: f64 = 0.0;
        for k in 0..3 {
            let at_lower = p[k] <= bounds.lower[k] && jtr[k] > 0.0;
            let at_upper = p[k] >= bounds.upper[k] && jtr[k] < 0.0;
            let periodic = k == 1 && bounds.longitude_is_periodic();
            if (at_lower || at_upper) && !periodic {
                active[k] = true;
            } else {
                pg_inf = pg_inf.max(jtr[k].abs());
            }
        }
        if pg_inf <= opts.gtol * (1.0 + cost) {
            return Solve { params: p, cost, converged: true, iterations: iteration };
        }

        let max_diag = (0..3).map(|k| jtj[k][k]).fold(0.0_f64, f64::max);
        let floor = (max_diag * DIAG_FLOOR).max(f64::MIN_POSITIVE);

        loop {
            let a = DMatrix::from_fn(3, 3, |i, j| {
                if active[i] || active[j] {
                    return if i == j { 1.0 } else { 0.0 };
                }
                let damping = if i == j { lambda * jtj[i][i].max(floor) } else { 0.0 };
                jtj[i][j] + damping
            });
            let rhs = DVector::from_fn(3, |i, _| if active[i] { 0.0 } else { -jtr[i] });

            let Some(delta) = solve_symmetric(&a, &rhs) else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    return Solve { params: p, cost, converged: false, iterations: iteration };
                }
                continue;
            };

            let trial = bounds.project([p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]]);
            let step = step_norm(&p, &trial, bounds);
            let p_norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            let small_step = step <= opts.xtol * (opts.xtol + p_norm);

            let trial_cost = problem.cost(&trial);
            if trial_cost.is_finite() && trial_cost < cost {
                let reduction = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                p = trial;
                (residuals, cost) = problem.evaluate(&p);
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if reduction <= opts.ftol || small_step {
                    return Solve { params: p, cost, converged: true, iterations: iteration };
                }
                break;
            }

            // Rejected: the damped step has collapsed onto the current point.
            if small_step {
                return Solve { params: p, cost, converged: true, iterations: iteration };
            }
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                return Solve { params: p, cost, converged: false, iterations: iteration };
            }
        }
    }

    Solve { params: p, cost, converged: false, iterations: opts.max_iterations }
}

/// Euclidean step length with the longitude difference taken the short way round.
fn step_norm(from: &[f64; 3], to: &[f64; 3], bounds: &ParameterBounds) -> f64 {
    let mut dl = to[1] - from[1];
    if bounds.longitude_is_periodic() {
        let span = bounds.upper[1] - bounds.lower[1];
        dl = (dl + span / 2.0).rem_euclid(span) - span / 2.0;
    }
    let da = to[0] - from[0];
    let db = to[2] - from[2];
    (da * da + dl * dl + db * db).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, Scaling};
    use crate::math::angular_separation;

    /// Deterministic, roughly uniform sky coverage (Fibonacci sphere).
    fn fibonacci_sky(n: usize) -> Vec<(f64, f64)> {
        let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
        (0..n)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
                let lon = (golden * i as f64).rem_euclid(std::f64::consts::TAU);
                (lon, z.asin())
            })
            .collect()
    }

    fn noiseless_set(truth: &DipoleParameters, scaling: Scaling, n: usize) -> ObservationSet {
        let model = DipoleModel::new(scaling);
        let obs = fibonacci_sky(n)
            .into_iter()
            .enumerate()
            .map(|(i, (l, b))| {
                let x = 0.05 + 0.9 * (i % 17) as f64 / 16.0;
                Observation {
                    independent_var: x,
                    longitude: l,
                    latitude: b,
                    residual: model.predict_at(truth, x, l, b),
                    weight: 1.0 / 0.15,
                }
            })
            .collect();
        ObservationSet::new(obs).unwrap()
    }

    #[test]
    fn fit_recovers_noiseless_dipole() {
        let truth = DipoleParameters::from_degrees(0.1, 150.0, -5.0);
        let set = noiseless_set(&truth, Scaling::Identity, 400);
        let guess = DipoleParameters::from_degrees(0.1, 148.0, -5.0);

        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &guess,
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap();

        assert!(fit.converged);
        assert!((fit.parameters.amplitude - 0.1).abs() < 1e-6);
        let sep = angular_separation(
            fit.parameters.longitude,
            fit.parameters.latitude,
            truth.longitude,
            truth.latitude,
        );
        assert!(sep < 1e-4, "separation {sep}");
        assert!(fit.cost < 1e-12);
        assert_eq!(fit.weighted_residuals.len(), 400);
    }

    #[test]
    fn fit_from_far_guess_without_linear_seed_stays_in_bounds() {
        let truth = DipoleParameters::from_degrees(0.3, 40.0, 20.0);
        let set = noiseless_set(&truth, Scaling::Constant, 300);
        let guess = DipoleParameters::from_degrees(0.05, 200.0, -10.0);
        let opts = FitOptions { linear_seed: false, ..FitOptions::default() };

        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Constant),
            &guess,
            &ParameterBounds::default(),
            &opts,
        )
        .unwrap();

        let bounds = ParameterBounds::default();
        assert!(bounds.contains(&fit.parameters));
        assert!(fit.cost.is_finite());
    }

    #[test]
    fn linear_seed_finds_global_minimum_from_bad_guess() {
        let truth = DipoleParameters::from_degrees(0.3, 40.0, 20.0);
        let set = noiseless_set(&truth, Scaling::Constant, 300);
        let guess = DipoleParameters::from_degrees(0.0, 220.0, -20.0);

        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Constant),
            &guess,
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap();

        assert!((fit.parameters.amplitude - 0.3).abs() < 1e-6);
        assert!(fit.converged);
    }

    #[test]
    fn amplitude_is_clamped_to_upper_bound() {
        let truth = DipoleParameters::from_degrees(5.0, 100.0, 30.0);
        let set = noiseless_set(&truth, Scaling::Constant, 200);

        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Constant),
            &DipoleParameters::from_degrees(0.1, 148.0, -5.0),
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap();

        assert!(fit.parameters.amplitude <= 2.0);
        assert!((fit.parameters.amplitude - 2.0).abs() < 1e-9);
        assert!(ParameterBounds::default().contains(&fit.parameters));
    }

    #[test]
    fn adversarial_data_stays_within_bounds() {
        let sky = fibonacci_sky(64);
        let obs: Vec<Observation> = sky
            .iter()
            .enumerate()
            .map(|(i, &(l, b))| Observation {
                independent_var: 1e3,
                longitude: l,
                latitude: b,
                residual: if i % 2 == 0 { 1e6 } else { -1e6 },
                weight: 1e-3 + i as f64,
            })
            .collect();
        let set = ObservationSet::new(obs).unwrap();

        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &DipoleParameters::from_degrees(0.1, 148.0, -5.0),
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap();

        let p = fit.parameters;
        assert!((0.0..=2.0).contains(&p.amplitude));
        assert!((0.0..std::f64::consts::TAU).contains(&p.longitude));
        assert!(p.latitude.abs() <= std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn empty_set_is_insufficient_data() {
        let set = ObservationSet::new(Vec::new()).unwrap();
        let err = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &DipoleParameters::from_degrees(0.1, 148.0, -5.0),
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AuditError::InsufficientData { available: 0, .. }));
    }

    #[test]
    fn zero_weight_is_rejected() {
        let set = ObservationSet::from_columns(
            &[0.5, 0.6],
            &[0.0, 1.0],
            &[0.0, 0.2],
            &[0.1, -0.1],
            Some(&[1.0, 0.0]),
        )
        .unwrap();
        let err = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &DipoleParameters::from_degrees(0.1, 148.0, -5.0),
            &ParameterBounds::default(),
            &FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AuditError::InvalidWeight { index: 1, .. }));
    }

    #[test]
    fn tiny_iteration_budget_reports_non_convergence() {
        let truth = DipoleParameters::from_degrees(0.4, 300.0, 45.0);
        let set = noiseless_set(&truth, Scaling::Identity, 200);
        let opts = FitOptions {
            max_iterations: 1,
            linear_seed: false,
            ..FitOptions::default()
        };
        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &DipoleParameters::from_degrees(0.01, 100.0, -40.0),
            &ParameterBounds::default(),
            &opts,
        )
        .unwrap();
        assert!(!fit.converged);
        assert_eq!(fit.iterations, 1);
    }

    #[test]
    fn weighted_jacobian_matches_finite_differences_of_residuals() {
        let base = noiseless_set(&DipoleParameters::new(0.2, 1.0, 0.3), Scaling::Identity, 20);
        let rows: Vec<_> = base
            .iter()
            .enumerate()
            .map(|(i, o)| Observation { weight: 0.5 + i as f64 * 0.1, ..*o })
            .collect();
        let set = ObservationSet::new(rows).unwrap();

        let problem = Problem::new(&set, &DipoleModel::new(Scaling::Identity));
        let p = [0.7, 2.2, -0.4];
        let axis = DipoleAxis::at(p[1], p[2]);
        let h = 1e-6;
        for k in 0..3 {
            let mut up = p;
            let mut dn = p;
            up[k] += h;
            dn[k] -= h;
            let (r_up, _) = problem.evaluate(&up);
            let (r_dn, _) = problem.evaluate(&dn);
            for (i, row) in problem.rows.iter().enumerate() {
                let fd = (r_up[i] - r_dn[i]) / (2.0 * h);
                let analytic = problem.jacobian_row(row, &p, &axis)[k];
                assert!((fd - analytic).abs() < 1e-7, "row {i} param {k}: fd={fd} analytic={analytic}");
            }
        }
    }

    #[test]
    fn cost_equals_sum_of_squared_weighted_residuals() {
        let set = noiseless_set(&DipoleParameters::new(0.2, 1.0, 0.3), Scaling::Identity, 50);
        let fit = fit_dipole(
            &set,
            &DipoleModel::new(Scaling::Identity),
            &DipoleParameters::new(0.0, 0.0, 0.0),
            &ParameterBounds::default(),
            &FitOptions { max_iterations: 2, ..FitOptions::default() },
        )
        .unwrap();
        let ss: f64 = fit.weighted_residuals.iter().map(|r| r * r).sum();
        assert!((ss - fit.cost).abs() <= 1e-12 * (1.0 + ss));
    }
}
