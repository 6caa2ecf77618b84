//! Resampling-based significance.
//!
//! Two strategies, kept as distinct operations with distinct result types:
//!
//! - label permutation builds a null distribution for the z-score
//! - case resampling (bootstrap) estimates the amplitude's sampling variability

pub mod estimator;
pub mod resample;
pub mod score;

pub use estimator::*;
pub use resample::*;
pub use score::*;
