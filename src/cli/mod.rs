//! Command-line parsing for the dipole audit.
//!
//! Argument parsing and command dispatch stay separate from the fitting and
//! resampling code. Defaults mirror `AuditConfig::default()`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Scaling, StdConvention, Strategy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dipole-audit", version, about = "Dipole anisotropy fit and significance audit")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a dipole to a residual table and assess its significance.
    Audit(AuditArgs),
    /// Write a seeded synthetic residual table (for calibration runs).
    Simulate(SimulateArgs),
}

/// Options for an audit run.
#[derive(Debug, Args, Clone)]
pub struct AuditArgs {
    /// Input CSV with columns x, lon, lat, residual and optional weight or sigma.
    #[arg(short, long, value_name = "CSV")]
    pub input: PathBuf,

    /// Angles in the CSV are radians (default: degrees).
    #[arg(long)]
    pub radians: bool,

    /// Subtract the mean residual before fitting.
    #[arg(long)]
    pub center: bool,

    /// Keep objects with independent variable strictly above this value.
    #[arg(long, env = "DIPOLE_AUDIT_CUTOFF", default_value_t = 0.02)]
    pub cutoff: f64,

    /// Disable the cutoff filter (overrides `--cutoff`).
    #[arg(long)]
    pub no_cutoff: bool,

    /// Resampling iterations K.
    #[arg(short = 'k', long, env = "DIPOLE_AUDIT_ITERATIONS", default_value_t = 100)]
    pub iterations: usize,

    /// Resampling strategy.
    #[arg(long, value_enum, default_value_t = Strategy::Permutation)]
    pub strategy: Strategy,

    /// Scaling g(x) of the dipole with the independent variable.
    #[arg(long, value_enum, default_value_t = Scaling::Identity)]
    pub scaling: Scaling,

    /// Random seed for resampling.
    #[arg(long, env = "DIPOLE_AUDIT_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Initial amplitude guess.
    #[arg(long, default_value_t = 0.1)]
    pub guess_amplitude: f64,

    /// Initial longitude guess (degrees).
    #[arg(long, default_value_t = 148.0, allow_negative_numbers = true)]
    pub guess_lon: f64,

    /// Initial latitude guess (degrees).
    #[arg(long, default_value_t = -5.0, allow_negative_numbers = true)]
    pub guess_lat: f64,

    /// Upper bound on the fitted amplitude.
    #[arg(long, default_value_t = 2.0)]
    pub max_amplitude: f64,

    /// Standard deviation convention for the null distribution.
    #[arg(long = "std", value_enum, default_value_t = StdConvention::Population)]
    pub std_convention: StdConvention,

    /// Fraction of non-convergent iterations above which the run is unreliable.
    #[arg(long, default_value_t = 0.2)]
    pub unreliable_threshold: f64,

    /// Confidence level for bootstrap percentile intervals.
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Run resampling iterations in parallel (results are identical).
    #[arg(long)]
    pub parallel: bool,

    /// Minimum number of observations after filtering.
    #[arg(long, default_value_t = 8)]
    pub min_observations: usize,

    /// Solver iteration budget per fit.
    #[arg(long, default_value_t = 200)]
    pub max_fit_iterations: usize,

    /// Only start the solver from the initial guess.
    #[arg(long)]
    pub no_linear_seed: bool,

    /// Write the verdict as JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,

    /// Write the resampled amplitudes as CSV.
    #[arg(long = "export-amplitudes", value_name = "CSV")]
    pub export_amplitudes: Option<PathBuf>,

    /// Print at most this many rejected input rows.
    #[arg(long, default_value_t = 10)]
    pub max_row_errors: usize,
}

/// Options for synthetic data generation.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Number of objects.
    #[arg(short = 'n', long, default_value_t = 2000)]
    pub count: usize,

    /// Injected dipole amplitude (0 for pure noise).
    #[arg(long, default_value_t = 0.0)]
    pub amplitude: f64,

    /// Injected dipole longitude (degrees).
    #[arg(long, default_value_t = 150.0, allow_negative_numbers = true)]
    pub lon: f64,

    /// Injected dipole latitude (degrees).
    #[arg(long, default_value_t = -5.0, allow_negative_numbers = true)]
    pub lat: f64,

    /// Gaussian noise standard deviation.
    #[arg(long, default_value_t = 0.15)]
    pub noise: f64,

    #[arg(long, default_value_t = 0.05)]
    pub x_min: f64,

    #[arg(long, default_value_t = 1.0)]
    pub x_max: f64,

    #[arg(long, value_enum, default_value_t = Scaling::Identity)]
    pub scaling: Scaling,

    #[arg(long, env = "DIPOLE_AUDIT_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Output CSV (angles in degrees). Defaults to stdout.
    #[arg(short, long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}
