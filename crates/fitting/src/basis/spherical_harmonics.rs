//! Real spherical harmonics radial basis.
//!
//! The radial function is `r(θ, φ) = Σ c_i Y_i(θ, φ)` over the real,
//! orthonormal harmonics without the Condon-Shortley phase. Coefficient
//! `(l, m)` lives at index `l² + l + m`, so an order-`L` fit has `(L + 1)²`
//! columns.
//!
//! Orders up to 3 use closed-form polynomials in the unit direction;
//! higher orders fall back to the associated-Legendre recursion. Both paths
//! produce the same values.

use std::f64::consts::PI;

use glam::DVec3;

use super::clamp_radius;
use crate::error::FitError;
use crate::matrix::DesignMatrix;

/// Highest order served by the closed-form path.
pub const CLOSED_FORM_MAX_ORDER: usize = 3;

/// Radii below this are clamped before the polar angle is taken.
const MIN_POINT_RADIUS: f64 = 1e-12;

// Normalization constants for the closed-form path
const Y00: f64 = 0.282_094_791_773_878_14;
const Y1: f64 = 0.488_602_511_902_919_9;
const Y2_XY: f64 = 1.092_548_430_592_079_2;
const Y2_Z: f64 = 0.315_391_565_252_520_05;
const Y2_XX: f64 = 0.546_274_215_296_039_6;
const Y3_3: f64 = 0.590_043_589_926_643_5;
const Y3_XYZ: f64 = 2.890_611_442_640_554;
const Y3_1: f64 = 0.457_045_799_464_465_8;
const Y3_0: f64 = 0.373_176_332_590_115_4;
const Y3_2: f64 = 1.445_305_721_320_277;

/// Number of coefficients for an order-`order` basis.
pub fn coefficient_count(order: usize) -> usize {
    (order + 1) * (order + 1)
}

/// Index of coefficient `(l, m)` with `-l <= m <= l`.
pub fn coefficient_index(l: usize, m: i32) -> usize {
    (l * l + l).wrapping_add_signed(m as isize)
}

/// Highest complete order representable by `len` coefficients.
pub fn order_for_len(len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let mut order = 0;
    while coefficient_count(order + 1) <= len {
        order += 1;
    }
    Some(order)
}

/// A point in spherical coordinates about some center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalCoord {
    /// Polar angle from +Z, in `[0, π]`
    pub theta: f64,
    /// Azimuth from +X, in `(-π, π]`
    pub phi: f64,
    pub radius: f64,
}

/// Convert `point` to spherical coordinates about `center`.
///
/// The radius is clamped away from zero so the polar angle stays defined; a
/// point at the center maps to `θ = 0`.
pub fn to_spherical(point: DVec3, center: DVec3) -> SphericalCoord {
    let d = point - center;
    let radius = d.length().max(MIN_POINT_RADIUS);
    let theta = (d.z / radius).clamp(-1.0, 1.0).acos();
    let phi = d.y.atan2(d.x);
    SphericalCoord { theta, phi, radius }
}

/// Unit direction for `(θ, φ)`.
pub fn direction(theta: f64, phi: f64) -> DVec3 {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    DVec3::new(st * cp, st * sp, ct)
}

/// Closed-form basis row for a unit direction, `order <= 3`.
///
/// Orders above [`CLOSED_FORM_MAX_ORDER`] are truncated to it.
pub fn closed_form_row(dir: DVec3, order: usize) -> Vec<f64> {
    let order = order.min(CLOSED_FORM_MAX_ORDER);
    let (x, y, z) = (dir.x, dir.y, dir.z);
    let mut row = Vec::with_capacity(coefficient_count(order));

    row.push(Y00);
    if order >= 1 {
        row.extend_from_slice(&[Y1 * y, Y1 * z, Y1 * x]);
    }
    if order >= 2 {
        row.extend_from_slice(&[
            Y2_XY * x * y,
            Y2_XY * y * z,
            Y2_Z * (3.0 * z * z - 1.0),
            Y2_XY * x * z,
            Y2_XX * (x * x - y * y),
        ]);
    }
    if order >= 3 {
        row.extend_from_slice(&[
            Y3_3 * y * (3.0 * x * x - y * y),
            Y3_XYZ * x * y * z,
            Y3_1 * y * (5.0 * z * z - 1.0),
            Y3_0 * (5.0 * z * z * z - 3.0 * z),
            Y3_1 * x * (5.0 * z * z - 1.0),
            Y3_2 * z * (x * x - y * y),
            Y3_3 * x * (x * x - 3.0 * y * y),
        ]);
    }
    row
}

/// Basis row from the associated-Legendre recursion, any order.
pub fn recursive_row(theta: f64, phi: f64, order: usize) -> Vec<f64> {
    let (s, x) = theta.sin_cos();
    let s = s.abs();
    let legendre = associated_legendre(x, s, order);
    let mut row = vec![0.0; coefficient_count(order)];

    for l in 0..=order {
        for m in 0..=l {
            let k = normalization(l, m);
            let p = legendre[legendre_index(l, m)];
            if m == 0 {
                row[coefficient_index(l, 0)] = k * p;
            } else {
                let mf = m as f64;
                let scaled = std::f64::consts::SQRT_2 * k * p;
                row[coefficient_index(l, m as i32)] = scaled * (mf * phi).cos();
                row[coefficient_index(l, -(m as i32))] = scaled * (mf * phi).sin();
            }
        }
    }
    row
}

/// Basis row for `(θ, φ)`, choosing the closed form when it covers `order`.
pub fn basis_row(theta: f64, phi: f64, order: usize) -> Vec<f64> {
    if order <= CLOSED_FORM_MAX_ORDER {
        closed_form_row(direction(theta, phi), order)
    } else {
        recursive_row(theta, phi, order)
    }
}

fn legendre_index(l: usize, m: usize) -> usize {
    l * (l + 1) / 2 + m
}

/// `P_l^m(x)` for `0 <= m <= l <= order`, no Condon-Shortley phase.
fn associated_legendre(x: f64, s: f64, order: usize) -> Vec<f64> {
    let mut p = vec![0.0; legendre_index(order, order) + 1];
    let mut pmm = 1.0;
    for m in 0..=order {
        if m > 0 {
            pmm *= (2 * m - 1) as f64 * s;
        }
        p[legendre_index(m, m)] = pmm;
        if m < order {
            p[legendre_index(m + 1, m)] = x * (2 * m + 1) as f64 * pmm;
        }
        for l in (m + 2)..=order {
            let a = (2 * l - 1) as f64 * x * p[legendre_index(l - 1, m)];
            let b = (l + m - 1) as f64 * p[legendre_index(l - 2, m)];
            p[legendre_index(l, m)] = (a - b) / (l - m) as f64;
        }
    }
    p
}

/// `sqrt((2l + 1) / 4π · (l - m)! / (l + m)!)`
fn normalization(l: usize, m: usize) -> f64 {
    // (l - m)! / (l + m)! as a running product to avoid overflow
    let mut ratio = 1.0;
    for k in (l - m + 1)..=(l + m) {
        ratio /= k as f64;
    }
    ((2 * l + 1) as f64 / (4.0 * PI) * ratio).sqrt()
}

/// Build the radial least-squares system for `points` about `center`.
///
/// Returns the design matrix (one row per point) and the radii as targets.
pub fn build_system(
    points: &[DVec3],
    center: DVec3,
    order: usize,
) -> Result<(DesignMatrix, Vec<f64>), FitError> {
    if points.is_empty() {
        return Err(FitError::EmptyPointSet);
    }
    let cols = coefficient_count(order);
    if points.len() < cols {
        return Err(FitError::InsufficientPoints {
            provided: points.len(),
            required: cols,
        });
    }

    let mut matrix = DesignMatrix::with_capacity(points.len(), cols);
    let mut targets = Vec::with_capacity(points.len());
    for &point in points {
        let coord = to_spherical(point, center);
        matrix.push_row(&basis_row(coord.theta, coord.phi, order))?;
        targets.push(coord.radius);
    }
    Ok((matrix, targets))
}

/// An evaluated radius and whether it hit the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusSample {
    pub radius: f64,
    pub clamped: bool,
}

/// Evaluate `r(θ, φ)` and report whether the result was clamped.
///
/// The order is inferred from the coefficient count; trailing coefficients
/// that do not complete an order are ignored. An empty coefficient set
/// evaluates to the floor.
pub fn evaluate_checked(theta: f64, phi: f64, coefficients: &[f64], min_radius: f64) -> RadiusSample {
    let Some(order) = order_for_len(coefficients.len()) else {
        let (radius, _) = clamp_radius(0.0, min_radius);
        return RadiusSample { radius, clamped: true };
    };

    let row = basis_row(theta, phi, order);
    let raw: f64 = row.iter().zip(coefficients).map(|(y, c)| y * c).sum();
    let (radius, clamped) = clamp_radius(raw, min_radius);
    RadiusSample { radius, clamped }
}

/// Evaluate `r(θ, φ)`. Always finite and at least the floor.
pub fn evaluate(theta: f64, phi: f64, coefficients: &[f64], min_radius: f64) -> f64 {
    evaluate_checked(theta, phi, coefficients, min_radius).radius
}

/// Evaluate the radius along a direction vector.
pub fn evaluate_direction(dir: DVec3, coefficients: &[f64], min_radius: f64) -> RadiusSample {
    let coord = to_spherical(dir, DVec3::ZERO);
    evaluate_checked(coord.theta, coord.phi, coefficients, min_radius)
}

/// `count` near-uniform unit directions on a Fibonacci spiral.
pub fn fibonacci_directions(count: usize) -> Vec<DVec3> {
    let golden = PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden * i as f64;
            DVec3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}
