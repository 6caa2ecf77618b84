//! `dipole-audit` library crate.
//!
//! Fits a directional (dipole) model to a weighted residual field on the sky and
//! audits it: bounded least-squares fit, resampling-based significance and an
//! information-criterion comparison against the isotropic model.
//!
//! The binary (`dipole-audit`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the engine can be driven from other programs with an `AuditConfig`

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod significance;

pub use app::pipeline::{AuditOutput, Resampled, run_audit, run_audit_with_cancel};
pub use domain::{AuditConfig, DipoleParameters, Observation, ObservationSet, ParameterBounds, Scaling, Strategy};
pub use error::{AuditError, Result};
