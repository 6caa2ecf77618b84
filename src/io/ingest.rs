//! CSV ingest and normalization.
//!
//! Turns a prepared residual table into a clean `ObservationSet`:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (row order is preserved)
//!
//! Columns (case-insensitive, BOM-tolerant):
//!
//! | field    | accepted headers                        |
//! |----------|-----------------------------------------|
//! | x        | `x`, `z`, `redshift`, `independent_var` |
//! | lon      | `lon`, `l`, `longitude`, `ra`           |
//! | lat      | `lat`, `b`, `latitude`, `dec`           |
//! | residual | `residual`                              |
//! | weight   | `weight`, or `1/sigma` from `sigma`/`err` (optional) |

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Observation, ObservationSet};
use crate::error::{AuditError, Result};

const X_HEADERS: &[&str] = &["x", "z", "redshift", "independent_var"];
const LON_HEADERS: &[&str] = &["lon", "l", "longitude", "ra"];
const LAT_HEADERS: &[&str] = &["lat", "b", "latitude", "dec"];
const RESIDUAL_HEADERS: &[&str] = &["residual"];
const WEIGHT_HEADERS: &[&str] = &["weight"];
const SIGMA_HEADERS: &[&str] = &["sigma", "err"];

/// How to read the input table.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub path: PathBuf,
    /// Angles are in degrees (converted to radians on read).
    pub degrees: bool,
    /// Drop rows with `x <= cutoff`.
    pub cutoff: Option<f64>,
    /// Subtract the mean residual after filtering.
    pub center: bool,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// What happened to the input rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_below_cutoff: usize,
    pub row_errors: Vec<RowError>,
}

#[derive(Debug, Clone)]
pub struct IngestedData {
    pub observations: ObservationSet,
    pub report: IngestReport,
}

/// Resolved column positions.
#[derive(Debug, Clone, Copy)]
struct Columns {
    x: usize,
    lon: usize,
    lat: usize,
    residual: usize,
    weight: WeightColumn,
}

#[derive(Debug, Clone, Copy)]
enum WeightColumn {
    Uniform,
    Weight(usize),
    Sigma(usize),
}

/// Load observations from a CSV file.
pub fn load_observations(opts: &IngestOptions) -> Result<IngestedData> {
    let file = File::open(&opts.path).map_err(|e| {
        AuditError::invalid_input(format!("Failed to open CSV '{}': {e}", opts.path.display()))
    })?;
    info!(path = %opts.path.display(), "reading observations");
    read_observations(file, opts)
}

/// Load observations from any reader (the file path in `opts` is ignored).
pub fn read_observations<R: Read>(input: R, opts: &IngestOptions) -> Result<IngestedData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let columns = resolve_columns(&build_header_map(&headers))?;

    let mut kept = Vec::new();
    let mut report = IngestReport::default();

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        report.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                report.row_errors.push(RowError { line, message: format!("CSV parse error: {e}") });
                continue;
            }
        };

        match parse_row(&record, &columns, opts.degrees) {
            Ok(o) => {
                if opts.cutoff.is_some_and(|c| o.independent_var <= c) {
                    report.rows_below_cutoff += 1;
                } else {
                    kept.push(o);
                }
            }
            Err(message) => {
                debug!(line, %message, "row rejected");
                report.row_errors.push(RowError { line, message });
            }
        }
    }

    report.rows_kept = kept.len();
    if kept.is_empty() {
        return Err(AuditError::InsufficientData { available: 0, required: 1 });
    }

    let mut observations = ObservationSet::new(kept)?;
    if opts.center {
        observations = observations.centered();
    }

    info!(
        rows = report.rows_read,
        kept = report.rows_kept,
        below_cutoff = report.rows_below_cutoff,
        rejected = report.row_errors.len(),
        "ingest finished"
    );

    Ok(IngestedData { observations, report })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn require_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize> {
    find_column(header_map, names).ok_or_else(|| {
        let accepted = names.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(", ");
        AuditError::invalid_input(format!("Missing required column (one of {accepted})."))
    })
}

fn resolve_columns(header_map: &HashMap<String, usize>) -> Result<Columns> {
    let weight = if let Some(i) = find_column(header_map, WEIGHT_HEADERS) {
        WeightColumn::Weight(i)
    } else if let Some(i) = find_column(header_map, SIGMA_HEADERS) {
        WeightColumn::Sigma(i)
    } else {
        WeightColumn::Uniform
    };
    Ok(Columns {
        x: require_column(header_map, X_HEADERS)?,
        lon: require_column(header_map, LON_HEADERS)?,
        lat: require_column(header_map, LAT_HEADERS)?,
        residual: require_column(header_map, RESIDUAL_HEADERS)?,
        weight,
    })
}

fn parse_row(record: &StringRecord, columns: &Columns, degrees: bool) -> std::result::Result<Observation, String> {
    let x = parse_field(record, columns.x, "x")?;
    let mut lon = parse_field(record, columns.lon, "lon")?;
    let mut lat = parse_field(record, columns.lat, "lat")?;
    let residual = parse_field(record, columns.residual, "residual")?;

    if degrees {
        lon = lon.to_radians();
        lat = lat.to_radians();
    }
    if lat.abs() > std::f64::consts::FRAC_PI_2 + 1e-12 {
        return Err(format!("Latitude out of range: {lat} rad."));
    }

    let weight = match columns.weight {
        WeightColumn::Uniform => 1.0,
        WeightColumn::Weight(i) => parse_field(record, i, "weight")?,
        WeightColumn::Sigma(i) => {
            let sigma = parse_field(record, i, "sigma")?;
            if sigma <= 0.0 {
                return Err(format!("Non-positive sigma: {sigma}."));
            }
            1.0 / sigma
        }
    };
    if !(weight.is_finite() && weight > 0.0) {
        return Err(format!("Invalid weight: {weight}."));
    }

    Ok(Observation { independent_var: x, longitude: lon, latitude: lat, residual, weight })
}

fn parse_field(record: &StringRecord, idx: usize, name: &str) -> std::result::Result<f64, String> {
    let raw = record.get(idx).map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(format!("Missing `{name}` value."));
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("Invalid `{name}` value: '{raw}'.")),
    }
}
