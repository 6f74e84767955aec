//! Boundary tests for fitted shapes.
//!
//! - Spherical harmonics use the radial test from `meshing`, driven by the
//!   evaluated radius per direction
//! - Elliptic-Fourier outlines use [`OutlineBoundary`]: even-odd ray
//!   casting in the outline plane, with radial projection onto the sampled
//!   polygon
//!
//! [`IdealShape`] is the common ideal-radius query behind both, the
//! occlusion test and shape-matching targets.

use fitting::basis::spherical_harmonics;
use glam::{DVec2, DVec3};
use meshing::{radial_direction, BoundarySample, BoundaryTest};

/// Planar directions shorter than this have no ray.
const MIN_PLANAR: f64 = 1e-12;

/// Ratios within this of 1.0 count as on the outline.
const SURFACE_TOLERANCE: f64 = 1e-6;

/// Closed outline in the plane `z = plane_z`, optionally thickened into a
/// slab of half-height `half_thickness`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineBoundary {
    pub center: DVec3,
    pub outline: Vec<DVec2>,
    pub plane_z: f64,
    pub half_thickness: f64,
    pub min_radius: f64,
}

impl OutlineBoundary {
    /// Even-odd point-in-polygon test in the outline plane.
    pub fn contains(&self, point: DVec2) -> bool {
        let n = self.outline.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.outline[i];
            let b = self.outline[(i + 1) % n];
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Distances along the planar ray from the center to every outline
    /// crossing, ascending.
    pub fn ray_hits(&self, direction: DVec2) -> Vec<f64> {
        let origin = self.center.truncate();
        let n = self.outline.len();
        let mut hits = Vec::new();
        for i in 0..n {
            let a = self.outline[i];
            let edge = self.outline[(i + 1) % n] - a;
            let denom = direction.perp_dot(edge);
            if denom.abs() < MIN_PLANAR {
                continue;
            }
            let to_a = a - origin;
            let t = to_a.perp_dot(edge) / denom;
            let s = to_a.perp_dot(direction) / denom;
            if t > 0.0 && (0.0..=1.0).contains(&s) {
                hits.push(t);
            }
        }
        hits.sort_by(f64::total_cmp);
        hits
    }

    /// Outermost outline distance along `direction` (projected into the
    /// plane), floored at `min_radius`.
    pub fn radius(&self, direction: DVec3) -> f64 {
        let planar = direction.truncate();
        let len = planar.length();
        if len < MIN_PLANAR {
            return self.min_radius;
        }
        self.ray_hits(planar / len)
            .last()
            .copied()
            .filter(|r| r.is_finite() && *r >= self.min_radius)
            .unwrap_or(self.min_radius)
    }
}

impl BoundaryTest for OutlineBoundary {
    fn test(&self, position: DVec3) -> BoundarySample {
        let origin = self.center.truncate();
        let planar = position.truncate() - origin;
        let distance = planar.length();
        let dir = if distance < MIN_PLANAR { DVec2::X } else { planar / distance };

        // Crossing nearest the point's own distance is the one it projects to
        let hits = self.ray_hits(dir);
        let ideal = hits
            .iter()
            .copied()
            .min_by(|a, b| (a - distance).abs().total_cmp(&(b - distance).abs()))
            .unwrap_or(self.min_radius)
            .max(self.min_radius);

        let z_offset = position.z - self.plane_z;
        let in_slab = z_offset.abs() <= self.half_thickness + SURFACE_TOLERANCE;
        let ratio = distance / ideal;
        let projected_xy = origin + dir * ideal;
        let projected_z = self.plane_z + z_offset.clamp(-self.half_thickness, self.half_thickness);

        BoundarySample {
            inside: in_slab && self.contains(position.truncate()),
            projected: projected_xy.extend(projected_z),
            surface: (ratio - 1.0).abs() <= SURFACE_TOLERANCE,
            distance_ratio: if in_slab { ratio } else { ratio.max(1.0 + SURFACE_TOLERANCE * 2.0) },
        }
    }
}

/// Ideal radius per direction for a fitted shape.
#[derive(Debug, Clone)]
pub enum IdealShape<'a> {
    Radial { coefficients: &'a [f64], min_radius: f64 },
    Outline(OutlineBoundary),
}

impl IdealShape<'_> {
    pub fn radius(&self, direction: DVec3) -> f64 {
        match self {
            Self::Radial { coefficients, min_radius } => {
                spherical_harmonics::evaluate_direction(direction, coefficients, *min_radius).radius
            }
            Self::Outline(outline) => outline.radius(direction),
        }
    }

    /// Radius toward `position` as seen from `center`.
    pub fn radius_toward(&self, position: DVec3, center: DVec3) -> f64 {
        self.radius(radial_direction(position, center).0)
    }
}
