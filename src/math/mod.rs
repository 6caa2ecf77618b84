//! Mathematical utilities: sphere geometry, summary statistics and least squares.

pub mod ols;
pub mod sphere;
pub mod stats;

pub use ols::*;
pub use sphere::*;
pub use stats::*;
