//! Constraint types consumed by the external position-based solver.
//!
//! - [`Constraint::Distance`] - XPBD edge length, compliance only
//! - [`Constraint::Spring`] - edge spring, stiffness and damping only
//! - [`Constraint::Dihedral`] - angle between two triangles on a shared edge
//! - [`Constraint::Angle`] - angle at the middle of three chained particles
//! - [`Constraint::ShapeMatch`] - rest offset from the internal centroid
//!
//! Every constraint belongs to a [`Tier`]; a solver processes tiers in
//! ascending order.

use glam::DVec3;
use serde::{Deserialize, Serialize};

const MIN_LENGTH: f64 = 1e-10;

/// Solver priority group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Structural,
    Bending,
    ShapeMatching,
}

/// A single constraint over particle indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Distance {
        particles: [usize; 2],
        rest_length: f64,
        /// Inverse stiffness; 0 is rigid
        compliance: f64,
        tier: Tier,
    },
    Spring {
        particles: [usize; 2],
        rest_length: f64,
        stiffness: f64,
        damping: f64,
        tier: Tier,
    },
    Dihedral {
        /// Shared edge `v0, v1` followed by the wings `wa, wb`
        particles: [usize; 4],
        rest_angle: f64,
        compliance: f64,
    },
    Angle {
        /// `a - vertex - b`
        particles: [usize; 3],
        rest_angle: f64,
        compliance: f64,
    },
    ShapeMatch {
        particle: usize,
        rest_offset: DVec3,
        stiffness: f64,
    },
}

impl Constraint {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Distance { tier, .. } | Self::Spring { tier, .. } => *tier,
            Self::Dihedral { .. } | Self::Angle { .. } => Tier::Bending,
            Self::ShapeMatch { .. } => Tier::ShapeMatching,
        }
    }

    /// Particle indices involved.
    pub fn particles(&self) -> &[usize] {
        match self {
            Self::Distance { particles, .. } | Self::Spring { particles, .. } => particles.as_slice(),
            Self::Dihedral { particles, .. } => particles.as_slice(),
            Self::Angle { particles, .. } => particles.as_slice(),
            Self::ShapeMatch { particle, .. } => std::slice::from_ref(particle),
        }
    }

    /// Sorted edge for two-particle constraints.
    pub fn edge(&self) -> Option<[usize; 2]> {
        match self {
            Self::Distance { particles: [a, b], .. } | Self::Spring { particles: [a, b], .. } => {
                Some(if a < b { [*a, *b] } else { [*b, *a] })
            }
            _ => None,
        }
    }

    pub fn compliance(&self) -> Option<f64> {
        match self {
            Self::Distance { compliance, .. }
            | Self::Dihedral { compliance, .. }
            | Self::Angle { compliance, .. } => Some(*compliance),
            Self::Spring { .. } | Self::ShapeMatch { .. } => None,
        }
    }

    /// Constraint violation for `positions`; zero at rest.
    ///
    /// Shape matching reports the offset error against `centroid`.
    pub fn evaluate(&self, positions: &[DVec3], centroid: DVec3) -> f64 {
        match self {
            Self::Distance { particles: [a, b], rest_length, .. }
            | Self::Spring { particles: [a, b], rest_length, .. } => {
                positions[*a].distance(positions[*b]) - rest_length
            }
            Self::Dihedral { particles: [v0, v1, wa, wb], rest_angle, .. } => {
                dihedral_angle(positions[*v0], positions[*v1], positions[*wa], positions[*wb]) - rest_angle
            }
            Self::Angle { particles: [a, v, b], rest_angle, .. } => {
                vertex_angle(positions[*a], positions[*v], positions[*b]) - rest_angle
            }
            Self::ShapeMatch { particle, rest_offset, .. } => {
                (positions[*particle] - centroid).distance(*rest_offset)
            }
        }
    }
}

/// Angle between the wings of two triangles sharing edge `(v0, v1)`.
///
/// Measured around the edge, so a flat pair with wings on opposite sides
/// gives π. Degenerate configurations also return π.
pub fn dihedral_angle(v0: DVec3, v1: DVec3, wa: DVec3, wb: DVec3) -> f64 {
    let edge = v1 - v0;
    let edge_len = edge.length();
    if edge_len < MIN_LENGTH {
        return std::f64::consts::PI;
    }
    let dir = edge / edge_len;

    let to_a = wa - v0;
    let to_b = wb - v0;
    let perp_a = to_a - dir * to_a.dot(dir);
    let perp_b = to_b - dir * to_b.dot(dir);

    let (len_a, len_b) = (perp_a.length(), perp_b.length());
    if len_a < MIN_LENGTH || len_b < MIN_LENGTH {
        return std::f64::consts::PI;
    }
    (perp_a.dot(perp_b) / (len_a * len_b)).clamp(-1.0, 1.0).acos()
}

/// Interior angle at `vertex` between `a` and `b`; π for degenerate input.
pub fn vertex_angle(a: DVec3, vertex: DVec3, b: DVec3) -> f64 {
    let (u, w) = (a - vertex, b - vertex);
    let (lu, lw) = (u.length(), w.length());
    if lu < MIN_LENGTH || lw < MIN_LENGTH {
        return std::f64::consts::PI;
    }
    (u.dot(w) / (lu * lw)).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_flat_dihedral_is_pi() {
        let angle = dihedral_angle(DVec3::ZERO, DVec3::X, DVec3::new(0.5, 1.0, 0.0), DVec3::new(0.5, -1.0, 0.0));
        assert_abs_diff_eq!(angle, PI, epsilon = 1e-12);
    }

    #[test]
    fn test_folded_dihedral() {
        let angle = dihedral_angle(DVec3::ZERO, DVec3::X, DVec3::new(0.5, 1.0, 0.0), DVec3::new(0.5, 0.0, 1.0));
        assert_abs_diff_eq!(angle, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_vertex_angle() {
        assert_abs_diff_eq!(vertex_angle(DVec3::X, DVec3::ZERO, DVec3::Y), FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(vertex_angle(DVec3::X, DVec3::ZERO, DVec3::NEG_X), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(vertex_angle(DVec3::ZERO, DVec3::ZERO, DVec3::X), PI);
    }

    #[test]
    fn test_tiers_and_particles() {
        let distance = Constraint::Distance {
            particles: [3, 1],
            rest_length: 1.0,
            compliance: 1e-3,
            tier: Tier::Structural,
        };
        assert_eq!(distance.edge(), Some([1, 3]));
        assert_eq!(distance.compliance(), Some(1e-3));

        let spring = Constraint::Spring {
            particles: [0, 2],
            rest_length: 1.0,
            stiffness: 10.0,
            damping: 1.0,
            tier: Tier::Bending,
        };
        assert_eq!(spring.tier(), Tier::Bending);
        assert_eq!(spring.compliance(), None);

        let shape = Constraint::ShapeMatch {
            particle: 4,
            rest_offset: DVec3::X,
            stiffness: 0.5,
        };
        assert_eq!(shape.particles(), &[4]);
        assert!(Tier::Structural < Tier::Bending && Tier::Bending < Tier::ShapeMatching);
    }

    #[test]
    fn test_evaluate_at_rest_is_zero() {
        let positions = [DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0)];
        let distance = Constraint::Distance {
            particles: [0, 1],
            rest_length: 1.0,
            compliance: 0.0,
            tier: Tier::Structural,
        };
        assert_abs_diff_eq!(distance.evaluate(&positions, DVec3::ZERO), 0.0);

        let angle = Constraint::Angle {
            particles: [0, 1, 2],
            rest_angle: FRAC_PI_2,
            compliance: 0.0,
        };
        assert_abs_diff_eq!(angle.evaluate(&positions, DVec3::ZERO), 0.0, epsilon = 1e-12);
    }
}
