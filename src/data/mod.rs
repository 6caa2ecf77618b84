//! Synthetic data for calibration runs and tests.

pub mod synthetic;

pub use synthetic::*;
