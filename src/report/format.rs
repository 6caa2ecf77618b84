//! Plain-text rendering of audit results.
//!
//! Formatting lives here so the numerical code stays free of presentation and
//! output changes stay localized.

use crate::io::ingest::IngestReport;
use crate::report::{AicComparison, AuditVerdict};
use crate::significance::Score;

/// Format the full verdict.
pub fn format_verdict(v: &AuditVerdict) -> String {
    let mut out = String::new();

    out.push_str("=== dipole-audit ===\n");
    out.push_str(&format!("Scaling: {}\n", v.scaling.display_name()));
    out.push_str(&format!("Sample: n={}\n", v.n_samples));

    out.push_str("\nDipole fit:\n");
    out.push_str(&format!("- D0        : {:.5}\n", v.d0_final));
    out.push_str(&format!(
        "- direction : l={:.2}°, b={:.2}°\n",
        v.direction.longitude_deg, v.direction.latitude_deg
    ));
    out.push_str(&format!("- cost      : {:.6} ({} solver iterations)\n", v.fit_cost, v.fit_iterations));

    out.push_str(&format!("\nSignificance ({}):\n", v.strategy.display_name()));
    out.push_str(&format!(
        "- iterations: {} requested, {} recorded, {} non-convergent\n",
        v.iterations_requested, v.iterations_recorded, v.convergence_failures
    ));
    match &v.z_score {
        Score::Defined { z } => out.push_str(&format!("- z-score   : {z:.3}\n")),
        Score::Undefined { reason } => out.push_str(&format!("- z-score   : undefined ({reason})\n")),
    }
    if let Some(p) = v.p_value_empirical {
        out.push_str(&format!("- p (empirical, one-sided): {}\n", fmt_p(p)));
    }
    if let Some(p) = v.p_value_gaussian {
        out.push_str(&format!("- p (Gaussian, one-sided) : {}\n", fmt_p(p)));
    }
    if let Some(b) = &v.bootstrap {
        out.push_str(&format!("- bootstrap mean D0: {:.5} ± {:.5} (SE)\n", b.mean, b.standard_error));
        out.push_str(&format!(
            "- {:.0}% percentile interval: [{:.5}, {:.5}]\n",
            b.confidence_level * 100.0,
            b.lower,
            b.upper
        ));
    }
    if v.cancelled {
        out.push_str("- WARNING: run was cancelled before all iterations completed\n");
    }
    if v.unreliable {
        out.push_str("- WARNING: too many non-convergent iterations; result is unreliable\n");
    }

    out.push_str("\nModel comparison (dipole − isotropic; negative favors the dipole):\n");
    match &v.delta_aic {
        AicComparison::Defined(cmp) => {
            out.push_str(&format!(
                "- ΔAIC = {:+.3}  (AIC dipole {:.3}, isotropic {:.3})\n",
                cmp.delta_aic, cmp.aic_dipole, cmp.aic_isotropic
            ));
            out.push_str(&format!(
                "- ΔBIC = {:+.3}  (BIC dipole {:.3}, isotropic {:.3})\n",
                cmp.delta_bic, cmp.bic_dipole, cmp.bic_isotropic
            ));
        }
        AicComparison::Undefined { reason } => {
            out.push_str(&format!("- ΔAIC undefined ({reason})\n"));
        }
    }

    out
}

/// Summarize what the CSV reader kept and dropped.
pub fn format_ingest_summary(report: &IngestReport, max_errors: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Input: {} row(s) read, {} kept, {} below cutoff, {} rejected\n",
        report.rows_read,
        report.rows_kept,
        report.rows_below_cutoff,
        report.row_errors.len()
    ));
    for e in report.row_errors.iter().take(max_errors) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if report.row_errors.len() > max_errors {
        out.push_str(&format!("  ... {} more\n", report.row_errors.len() - max_errors));
    }
    out
}

fn fmt_p(p: f64) -> String {
    if p < 1e-4 { format!("{p:.2e}") } else { format!("{p:.4}") }
}
