//! Spherical geometry on the unit sphere.
//!
//! Positions are `(longitude, latitude)` in radians. The dipole model only needs
//! the cosine of the angular separation, which we evaluate with the spherical
//! law of cosines:
//!
//! `cos θ = sin b1 sin b2 + cos b1 cos b2 cos(l1 − l2)`

use std::f64::consts::TAU;

/// Cosine of the angular separation between two sky positions.
#[inline]
pub fn cos_separation(l1: f64, b1: f64, l2: f64, b2: f64) -> f64 {
    b1.sin() * b2.sin() + b1.cos() * b2.cos() * (l1 - l2).cos()
}

/// Angular separation in radians, in `[0, π]`.
pub fn angular_separation(l1: f64, b1: f64, l2: f64, b2: f64) -> f64 {
    // Rounding can push the cosine slightly outside [-1, 1].
    cos_separation(l1, b1, l2, b2).clamp(-1.0, 1.0).acos()
}

/// Unit vector for a sky position.
#[inline]
pub fn unit_vector(l: f64, b: f64) -> [f64; 3] {
    let (sin_b, cos_b) = b.sin_cos();
    let (sin_l, cos_l) = l.sin_cos();
    [cos_b * cos_l, cos_b * sin_l, sin_b]
}

/// Norm, longitude in `[0, 2π)` and latitude of a Cartesian vector.
///
/// The direction of the zero vector is reported as `(0, 0)`.
pub fn from_cartesian(v: [f64; 3]) -> (f64, f64, f64) {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return (0.0, 0.0, 0.0);
    }
    let lon = wrap_longitude(v[1].atan2(v[0]));
    let lat = (v[2] / norm).clamp(-1.0, 1.0).asin();
    (norm, lon, lat)
}

/// Wrap a longitude into `[0, 2π)`.
#[inline]
pub fn wrap_longitude(l: f64) -> f64 {
    let w = l.rem_euclid(TAU);
    if w >= TAU { 0.0 } else { w }
}
