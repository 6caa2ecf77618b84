//! Directional anisotropy model.
//!
//! The model is a small, pure value type so that fitting and resampling code can
//! stay generic over the scaling choice.

pub mod dipole;

pub use dipole::*;
