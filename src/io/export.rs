//! Export audit results.
//!
//! - verdict as JSON (with a generation timestamp), for downstream scripts
//! - resampled amplitudes as CSV, for histograms in a spreadsheet
//! - observation tables as CSV (angles in degrees), readable by `ingest`

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ObservationSet, Strategy};
use crate::error::{AuditError, Result};
use crate::io::ingest::IngestReport;
use crate::report::AuditVerdict;

#[derive(Debug, Serialize)]
struct VerdictDocument<'a> {
    tool: &'static str,
    version: &'static str,
    generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ingest: Option<&'a IngestReport>,
    verdict: &'a AuditVerdict,
}

/// Serialize a verdict document to any writer.
pub fn write_verdict_json_to<W: Write>(
    out: W,
    verdict: &AuditVerdict,
    ingest: Option<&IngestReport>,
    generated_at: DateTime<Utc>,
) -> Result<()> {
    let doc = VerdictDocument {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        generated_at,
        ingest,
        verdict,
    };
    serde_json::to_writer_pretty(out, &doc)?;
    Ok(())
}

/// Write the verdict to a JSON file stamped with the current time.
pub fn write_verdict_json(path: &Path, verdict: &AuditVerdict, ingest: Option<&IngestReport>) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        AuditError::invalid_input(format!("Failed to create verdict JSON '{}': {e}", path.display()))
    })?;
    write_verdict_json_to(file, verdict, ingest, Utc::now())
}

/// Write resampled amplitudes (iteration order) as `index,strategy,amplitude`.
pub fn write_amplitudes_csv_to<W: Write>(out: W, strategy: Strategy, amplitudes: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["index", "strategy", "amplitude"])?;
    let label = match strategy {
        Strategy::Permutation => "permutation",
        Strategy::Bootstrap => "bootstrap",
    };
    for (i, a) in amplitudes.iter().enumerate() {
        writer.write_record([i.to_string(), label.to_string(), format!("{a:.10}")])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_amplitudes_csv(path: &Path, strategy: Strategy, amplitudes: &[f64]) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        AuditError::invalid_input(format!("Failed to create amplitude CSV '{}': {e}", path.display()))
    })?;
    write_amplitudes_csv_to(file, strategy, amplitudes)
}

/// Write observations as `x,lon,lat,residual,weight` with angles in degrees.
pub fn write_observations_csv_to<W: Write>(out: W, observations: &ObservationSet) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["x", "lon", "lat", "residual", "weight"])?;
    for o in observations {
        writer.write_record([
            format!("{:.10}", o.independent_var),
            format!("{:.10}", o.longitude.to_degrees()),
            format!("{:.10}", o.latitude.to_degrees()),
            format!("{:.10}", o.residual),
            format!("{:.10}", o.weight),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::domain::Scaling;
    use crate::report::{AicComparison, Direction};
    use crate::significance::Score;

    fn verdict() -> AuditVerdict {
        AuditVerdict {
            d0_final: 0.05,
            direction: Direction { longitude_deg: 10.0, latitude_deg: 20.0 },
            z_score: Score::Defined { z: 1.5 },
            delta_aic: AicComparison::Undefined { reason: "zero RSS".into() },
            n_samples: 42,
            convergence_failures: 0,
            strategy: Strategy::Permutation,
            scaling: Scaling::Identity,
            iterations_requested: 10,
            iterations_recorded: 10,
            unreliable: false,
            cancelled: false,
            p_value_empirical: Some(0.1),
            p_value_gaussian: Some(0.0668),
            bootstrap: None,
            fit_iterations: 4,
            fit_cost: 12.0,
        }
    }

    #[test]
    fn verdict_json_has_timestamp_and_fields() {
        let mut buf = Vec::new();
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        write_verdict_json_to(&mut buf, &verdict(), None, ts).unwrap();

        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["tool"], "dipole-audit");
        assert_eq!(v["generated_at"], "2026-01-02T03:04:05Z");
        assert_eq!(v["verdict"]["n_samples"], 42);
        assert_eq!(v["verdict"]["z_score"]["z"], 1.5);
        assert!(v.get("ingest").is_none());
    }

    #[test]
    fn observations_csv_round_trips_through_ingest() {
        use crate::data::{SyntheticSpec, generate_observations};
        use crate::io::ingest::{IngestOptions, read_observations};

        let set = generate_observations(&SyntheticSpec { n: 25, ..SyntheticSpec::default() }).unwrap();
        let mut buf = Vec::new();
        write_observations_csv_to(&mut buf, &set).unwrap();

        let opts = IngestOptions { path: "<memory>".into(), degrees: true, cutoff: None, center: false };
        let back = read_observations(buf.as_slice(), &opts).unwrap().observations;
        assert_eq!(back.len(), set.len());
        for (a, b) in set.iter().zip(back.iter()) {
            assert!((a.longitude - b.longitude).abs() < 1e-9);
            assert!((a.latitude - b.latitude).abs() < 1e-9);
            assert!((a.residual - b.residual).abs() < 1e-9);
        }
    }

    #[test]
    fn amplitudes_csv_is_ordered() {
        let mut buf = Vec::new();
        write_amplitudes_csv_to(&mut buf, Strategy::Bootstrap, &[0.1, 0.25]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "index,strategy,amplitude");
        assert_eq!(lines[1], "0,bootstrap,0.1000000000");
        assert_eq!(lines[2], "1,bootstrap,0.2500000000");
    }
}
