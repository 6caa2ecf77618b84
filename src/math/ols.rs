//! Small dense least-squares solvers.
//!
//! Two kinds of linear problems show up in the fitter:
//!
//! ```text
//! minimize ‖X β − y‖²            (tall system, rows already scaled by weights)
//! (JᵀJ + λ D) δ = −Jᵀr           (3×3 damped normal equations per LM step)
//! ```
//!
//! Implementation choices:
//! - Tall systems go through SVD so rank-deficient designs (e.g. every object on
//!   a great circle) still produce a minimum-norm answer instead of panicking.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - The damped normal equations are symmetric positive definite whenever
//!   `λ > 0` and `D` has a positive floor, so Cholesky is tried first and SVD is
//!   only a fallback.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve a symmetric positive (semi-)definite system `a x = b`.
pub fn solve_symmetric(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, b)
}
