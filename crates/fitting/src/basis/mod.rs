//! Design-matrix builders for shape bases.
//!
//! Builders are pure functions from a point set and basis order to a
//! [`DesignMatrix`](crate::DesignMatrix) plus target vector(s):
//! - [`spherical_harmonics`] - real orthonormal SH radial function `r(θ, φ)`
//! - [`elliptic_fourier`] - closed 2-D outline as a truncated Fourier series

pub mod elliptic_fourier;
pub mod spherical_harmonics;

/// Floor applied when a caller-supplied minimum radius is itself unusable.
pub const RADIUS_FLOOR: f64 = 1e-6;

/// Replace a non-finite radius, or one below the floor, with the floor.
///
/// Returns the sanitized radius and whether it was clamped.
pub fn clamp_radius(radius: f64, min_radius: f64) -> (f64, bool) {
    let floor = if min_radius.is_finite() && min_radius > 0.0 {
        min_radius
    } else {
        RADIUS_FLOOR
    };
    if radius.is_finite() && radius >= floor {
        (radius, false)
    } else {
        (floor, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_radius() {
        assert_eq!(clamp_radius(0.5, 1e-3), (0.5, false));
        assert_eq!(clamp_radius(-2.0, 1e-3), (1e-3, true));
        assert_eq!(clamp_radius(0.0, 1e-3), (1e-3, true));
        assert_eq!(clamp_radius(f64::NAN, 1e-3), (1e-3, true));
        assert_eq!(clamp_radius(f64::INFINITY, 1e-3), (1e-3, true));
        assert_eq!(clamp_radius(1e-4, 1e-3), (1e-3, true));
        assert_eq!(clamp_radius(-1.0, f64::NAN), (RADIUS_FLOOR, true));
    }
}
