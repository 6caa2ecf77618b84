//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - reads the residual table
//! - runs the audit pipeline
//! - prints the report and writes optional exports

use std::io::Write;

use clap::Parser;
use tracing::info;

use crate::cli::{AuditArgs, Cli, Command, SimulateArgs};
use crate::data::{SyntheticSpec, generate_observations};
use crate::domain::{AuditConfig, DipoleParameters, ParameterBounds};
use crate::error::Result;
use crate::fit::FitOptions;
use crate::io::{IngestOptions, load_observations, write_amplitudes_csv, write_observations_csv_to, write_verdict_json};

pub mod pipeline;

/// Entry point for the `dipole-audit` binary.
pub fn run() -> Result<()> {
    // Environment fallbacks (DIPOLE_AUDIT_*) may come from a local `.env`.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Audit(args) => handle_audit(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

fn handle_audit(args: &AuditArgs) -> Result<()> {
    let config = audit_config_from_args(args);
    config.validate()?;

    let ingest = load_observations(&IngestOptions {
        path: args.input.clone(),
        degrees: !args.radians,
        cutoff: config.cutoff,
        center: args.center,
    })?;
    println!("{}", crate::report::format_ingest_summary(&ingest.report, args.max_row_errors));

    let out = pipeline::run_audit(&ingest.observations, &config)?;
    println!("{}", crate::report::format_verdict(&out.verdict));

    if let Some(path) = &args.export_json {
        write_verdict_json(path, &out.verdict, Some(&ingest.report))?;
        info!(path = %path.display(), "verdict written");
    }
    if let Some(path) = &args.export_amplitudes {
        write_amplitudes_csv(path, out.resampled.strategy(), out.resampled.amplitudes())?;
        info!(path = %path.display(), "amplitudes written");
    }
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<()> {
    let spec = synthetic_spec_from_args(args);
    let observations = generate_observations(&spec)?;
    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            write_observations_csv_to(file, &observations)?;
            info!(path = %path.display(), n = observations.len(), "synthetic table written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_observations_csv_to(&mut lock, &observations)?;
            lock.flush()?;
        }
    }
    Ok(())
}

/// Build the audit configuration from CLI flags.
pub fn audit_config_from_args(args: &AuditArgs) -> AuditConfig {
    AuditConfig {
        cutoff: if args.no_cutoff { None } else { Some(args.cutoff) },
        iterations: args.iterations,
        initial_guess: DipoleParameters::from_degrees(args.guess_amplitude, args.guess_lon, args.guess_lat),
        bounds: ParameterBounds::with_max_amplitude(args.max_amplitude),
        scaling: args.scaling,
        strategy: args.strategy,
        seed: args.seed,
        std_convention: args.std_convention,
        unreliable_threshold: args.unreliable_threshold,
        confidence_level: args.confidence,
        parallel: args.parallel,
        min_observations: args.min_observations,
        fit: FitOptions {
            max_iterations: args.max_fit_iterations,
            linear_seed: !args.no_linear_seed,
            ..FitOptions::default()
        },
    }
}

pub fn synthetic_spec_from_args(args: &SimulateArgs) -> SyntheticSpec {
    SyntheticSpec {
        n: args.count,
        x_min: args.x_min,
        x_max: args.x_max,
        noise_sigma: args.noise,
        dipole: (args.amplitude > 0.0).then(|| DipoleParameters::from_degrees(args.amplitude, args.lon, args.lat)),
        scaling: args.scaling,
        seed: args.seed,
    }
}
