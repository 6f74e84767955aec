//! Elliptic Fourier descriptors for closed 2-D outlines.
//!
//! The outline is reparametrized by cumulative arc length into `[0, 2π)`
//! and each coordinate is fitted independently against
//! `[1, cos t, sin t, cos 2t, sin 2t, ...]`.

use std::f64::consts::TAU;

use glam::DVec2;

use crate::error::FitError;
use crate::matrix::DesignMatrix;

/// Fewest outline points accepted for any order.
pub const MIN_POINTS: usize = 4;

/// Total arc lengths below this are degenerate.
const MIN_ARC_LENGTH: f64 = 1e-12;

/// Number of coefficients per coordinate for an order-`order` series.
pub fn coefficient_count(order: usize) -> usize {
    2 * order + 1
}

/// Arc-length parameters `t_i ∈ [0, 2π)` for a closed polyline.
///
/// Returns the parameters and the total length including the closing
/// segment back to the first point.
pub fn arc_length_parameters(points: &[DVec2]) -> Result<(Vec<f64>, f64), FitError> {
    if points.len() < MIN_POINTS {
        return Err(FitError::InsufficientPoints {
            provided: points.len(),
            required: MIN_POINTS,
        });
    }

    let mut cumulative = Vec::with_capacity(points.len());
    let mut length = 0.0;
    cumulative.push(0.0);
    for pair in points.windows(2) {
        length += pair[0].distance(pair[1]);
        cumulative.push(length);
    }
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        length += last.distance(*first);
    }

    if !length.is_finite() || length < MIN_ARC_LENGTH {
        return Err(FitError::DegenerateBoundary { arc_length: length });
    }

    let params = cumulative.into_iter().map(|s| TAU * s / length).collect();
    Ok((params, length))
}

/// `[1, cos t, sin t, ..., cos(order·t), sin(order·t)]`
pub fn basis_row(t: f64, order: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(coefficient_count(order));
    row.push(1.0);
    for k in 1..=order {
        let (s, c) = (k as f64 * t).sin_cos();
        row.push(c);
        row.push(s);
    }
    row
}

/// Design matrix and per-axis targets for an outline.
#[derive(Debug, Clone, PartialEq)]
pub struct EfdSystem {
    pub matrix: DesignMatrix,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub total_length: f64,
}

/// Build the least-squares system for a closed outline.
pub fn build_system(points: &[DVec2], order: usize) -> Result<EfdSystem, FitError> {
    let required = MIN_POINTS.max(coefficient_count(order));
    if points.len() < required {
        return Err(FitError::InsufficientPoints {
            provided: points.len(),
            required,
        });
    }

    let (params, total_length) = arc_length_parameters(points)?;
    let mut matrix = DesignMatrix::with_capacity(points.len(), coefficient_count(order));
    for &t in &params {
        matrix.push_row(&basis_row(t, order))?;
    }

    Ok(EfdSystem {
        matrix,
        x: points.iter().map(|p| p.x).collect(),
        y: points.iter().map(|p| p.y).collect(),
        total_length,
    })
}

/// Evaluate the outline at parameter `t`.
pub fn evaluate(x_coefficients: &[f64], y_coefficients: &[f64], t: f64) -> DVec2 {
    let order = x_coefficients.len().min(y_coefficients.len()).saturating_sub(1) / 2;
    let row = basis_row(t, order);
    let dot = |c: &[f64]| row.iter().zip(c).map(|(a, b)| a * b).sum::<f64>();
    DVec2::new(dot(x_coefficients), dot(y_coefficients))
}

/// `samples` evenly spaced points around the fitted outline.
pub fn sample_outline(x_coefficients: &[f64], y_coefficients: &[f64], samples: usize) -> Vec<DVec2> {
    (0..samples)
        .map(|i| evaluate(x_coefficients, y_coefficients, TAU * i as f64 / samples as f64))
        .collect()
}
