//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - verdict JSON and amplitude CSV exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
