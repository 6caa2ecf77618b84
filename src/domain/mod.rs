//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`Scaling`, `Strategy`, `StdConvention`)
//! - the observation set consumed by the engine (`Observation`, `ObservationSet`)
//! - model parameters, bounds and fit outputs (`DipoleParameters`, `FitResult`)
//! - the run configuration record (`AuditConfig`)

pub mod types;

pub use types::*;
