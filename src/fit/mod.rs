//! Dipole fitting and model comparison.
//!
//! Responsibilities:
//!
//! - bounded Levenberg–Marquardt fit of `(D0, l_p, b_p)`
//! - closed-form Cartesian seed for the multi-start
//! - AIC / BIC comparison against the isotropic model

pub mod comparison;
pub mod fitter;

pub use comparison::*;
pub use fitter::*;
