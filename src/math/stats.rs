//! Summary statistics for resampled distributions.

use crate::domain::StdConvention;

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation under the given convention.
///
/// Returns `None` when there are not enough values for the requested degrees of
/// freedom (`n <= ddof`).
pub fn std_dev(values: &[f64], convention: StdConvention) -> Option<f64> {
    let n = values.len();
    let ddof = convention.ddof();
    if n <= ddof {
        return None;
    }
    // Identical values: exact zero, free of rounding in the mean.
    if values.iter().all(|&v| v == values[0]) {
        return Some(0.0);
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (n - ddof) as f64).sqrt())
}

/// Quantile of sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `None`
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        len => {
            let q = q.clamp(0.0, 1.0);
            let pos = q * (len - 1) as f64;
            let i = pos.floor() as usize;
            let j = pos.ceil() as usize;
            if i == j {
                return Some(sorted[i]);
            }
            let t = pos - i as f64;
            Some((1.0 - t) * sorted[i] + t * sorted[j])
        }
    }
}

/// Sorted copy of `values` (total order, NaN last).
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}
