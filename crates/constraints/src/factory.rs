//! Constraint factory: topology + material → tiered constraint set.
//!
//! Three tiers are generated in order:
//! 1. Structural - one distance (XPBD) or spring constraint per edge
//! 2. Bending - dihedral/wing springs across interior triangle edges, or
//!    angle/skip springs along chains
//! 3. Shape matching - per-particle rest offsets from the mass-weighted
//!    centroid of the internal region
//!
//! Stiffness is normalized by mesh density: the average edge length over
//! `reference_edge_length`, clamped to `[0.1, 1]`, scales every stiffness
//! (and so every compliance) so finer meshes do not over-stiffen.

use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

use glam::DVec3;
use meshing::Topology;
use morpho_config::{Material, PhysicsConfig, PhysicsModel};
use tracing::{debug, trace};

use crate::constraint::{dihedral_angle, vertex_angle, Constraint, Tier};
use crate::error::ConstraintError;
use crate::material::MaterialQuery;
use crate::particle::PhysicsState;

/// Lower clamp for the density factor.
pub const MIN_DENSITY_FACTOR: f64 = 0.1;

/// Upper clamp for the density factor.
pub const MAX_DENSITY_FACTOR: f64 = 1.0;

/// Where bending constraints come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BendingSource {
    /// No bending tier
    None,
    /// Interior edges of the triangle list
    Triangles,
    /// Consecutive surface vertices `0..surface_count`, optionally wrapping around
    Chain { closed: bool },
}

/// Everything the factory needs about one body.
#[derive(Debug, Clone)]
pub struct ConstraintRequest<'a> {
    pub topology: &'a Topology,
    /// Rest positions, one per topology vertex
    pub positions: &'a [DVec3],
    /// Leading vertices that mirror surface points
    pub surface_count: usize,
    pub bending: BendingSource,
    /// Generate shape-matching offsets for volumetric bodies
    pub shape_matching: bool,
}

/// Constraint counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub structural: usize,
    pub bending: usize,
    pub shape_matching: usize,
}

impl TierCounts {
    pub fn of(constraints: &[Constraint]) -> Self {
        let mut counts = Self::default();
        for c in constraints {
            match c.tier() {
                Tier::Structural => counts.structural += 1,
                Tier::Bending => counts.bending += 1,
                Tier::ShapeMatching => counts.shape_matching += 1,
            }
        }
        counts
    }
}

/// Average edge length over `reference_edge_length`, clamped to `[0.1, 1]`.
///
/// A topology without edges has factor 1.
pub fn density_factor(topology: &Topology, positions: &[DVec3], reference_edge_length: f64) -> f64 {
    let edges = topology.edges();
    if edges.is_empty() || !(reference_edge_length > 0.0) {
        return MAX_DENSITY_FACTOR;
    }
    let total: f64 = edges
        .iter()
        .map(|&[a, b]| positions[a].distance(positions[b]))
        .sum();
    let average = total / edges.len() as f64;
    let factor = average / reference_edge_length;
    if factor.is_finite() {
        factor.clamp(MIN_DENSITY_FACTOR, MAX_DENSITY_FACTOR)
    } else {
        MAX_DENSITY_FACTOR
    }
}

fn compliance_for(stiffness: f64) -> f64 {
    if stiffness > 0.0 { 1.0 / stiffness } else { f64::INFINITY }
}

fn midpoint_material(material: &impl MaterialQuery, positions: &[DVec3], particles: &[usize]) -> Material {
    let sum: DVec3 = particles.iter().map(|&i| positions[i]).sum();
    material.material_at(sum / particles.len().max(1) as f64)
}

fn edge_constraint(
    [a, b]: [usize; 2],
    positions: &[DVec3],
    material: &impl MaterialQuery,
    config: &PhysicsConfig,
    factor: f64,
    tier: Tier,
) -> Constraint {
    let m = midpoint_material(material, positions, &[a, b]);
    let scale = if tier == Tier::Bending { config.bending_scale } else { 1.0 };
    let rest_length = positions[a].distance(positions[b]);
    match config.model {
        PhysicsModel::Xpbd => Constraint::Distance {
            particles: [a, b],
            rest_length,
            compliance: compliance_for(m.stiffness * scale * factor),
            tier,
        },
        PhysicsModel::Spring => Constraint::Spring {
            particles: [a, b],
            rest_length,
            stiffness: m.stiffness * scale * factor,
            damping: m.damping * factor,
            tier,
        },
    }
}

fn bending_constraints(
    request: &ConstraintRequest<'_>,
    material: &impl MaterialQuery,
    config: &PhysicsConfig,
    factor: f64,
) -> Vec<Constraint> {
    let positions = request.positions;
    let mut out = Vec::new();

    match request.bending {
        BendingSource::None => {}
        BendingSource::Triangles => {
            for interior in request.topology.interior_edges() {
                let [v0, v1] = interior.edge;
                let [wa, wb] = interior.wings;
                match config.model {
                    PhysicsModel::Xpbd => {
                        let m = midpoint_material(material, positions, &[v0, v1]);
                        out.push(Constraint::Dihedral {
                            particles: [v0, v1, wa, wb],
                            rest_angle: dihedral_angle(positions[v0], positions[v1], positions[wa], positions[wb]),
                            compliance: compliance_for(m.stiffness * config.bending_scale * factor),
                        });
                    }
                    PhysicsModel::Spring => {
                        out.push(edge_constraint([wa, wb], positions, material, config, factor, Tier::Bending));
                    }
                }
            }
        }
        BendingSource::Chain { closed } => {
            let n = request.surface_count.min(positions.len());
            if n < 3 {
                return out;
            }
            let mut triples: Vec<[usize; 3]> = (1..n - 1).map(|i| [i - 1, i, i + 1]).collect();
            if closed {
                triples.push([n - 2, n - 1, 0]);
                triples.push([n - 1, 0, 1]);
            }
            for [a, v, b] in triples {
                match config.model {
                    PhysicsModel::Xpbd => {
                        let m = midpoint_material(material, positions, &[a, v, b]);
                        out.push(Constraint::Angle {
                            particles: [a, v, b],
                            rest_angle: vertex_angle(positions[a], positions[v], positions[b]),
                            compliance: compliance_for(m.stiffness * config.bending_scale * factor),
                        });
                    }
                    PhysicsModel::Spring => {
                        out.push(edge_constraint([a, b], positions, material, config, factor, Tier::Bending));
                    }
                }
            }
        }
    }
    out
}

/// Mass-weighted centroid of `positions[region]`, or of all positions when
/// the region is empty.
pub fn weighted_centroid(positions: &[DVec3], masses: &[f64], region: Range<usize>) -> DVec3 {
    let region = if region.is_empty() || region.end > positions.len() {
        0..positions.len()
    } else {
        region
    };
    let mut sum = DVec3::ZERO;
    let mut total = 0.0;
    for i in region.clone() {
        let m = masses.get(i).copied().unwrap_or(1.0).max(0.0);
        sum += positions[i] * m;
        total += m;
    }
    if total > 0.0 {
        sum / total
    } else if region.is_empty() {
        DVec3::ZERO
    } else {
        region.clone().map(|i| positions[i]).sum::<DVec3>() / region.len() as f64
    }
}

/// Build every tier of constraints for `request`.
pub fn build_constraints(
    request: &ConstraintRequest<'_>,
    material: &impl MaterialQuery,
    config: &PhysicsConfig,
) -> Result<Vec<Constraint>, ConstraintError> {
    let positions = request.positions;
    if positions.len() != request.topology.vertex_count() {
        return Err(ConstraintError::PositionCountMismatch {
            expected: request.topology.vertex_count(),
            found: positions.len(),
        });
    }
    let start = Instant::now();
    let factor = density_factor(request.topology, positions, config.reference_edge_length);

    let mut constraints: Vec<Constraint> = request
        .topology
        .edges()
        .iter()
        .map(|&edge| edge_constraint(edge, positions, material, config, factor, Tier::Structural))
        .collect();
    let structural = constraints.len();

    constraints.extend(bending_constraints(request, material, config, factor));

    if request.shape_matching {
        let masses: Vec<f64> = positions.iter().map(|&p| material.material_at(p).mass).collect();
        let internal = request.surface_count..positions.len();
        let centroid = weighted_centroid(positions, &masses, internal);
        constraints.extend((0..positions.len()).map(|i| Constraint::ShapeMatch {
            particle: i,
            rest_offset: positions[i] - centroid,
            stiffness: config.shape_matching_stiffness,
        }));
    }

    validate_constraints(&constraints, positions.len())?;
    debug!(
        "build_constraints: {} structural, {} total, density factor {:.3} in {:?}",
        structural,
        constraints.len(),
        factor,
        start.elapsed()
    );
    Ok(constraints)
}

/// Particles plus constraints for `request`.
pub fn build_physics(
    request: &ConstraintRequest<'_>,
    material: &impl MaterialQuery,
    config: &PhysicsConfig,
) -> Result<PhysicsState, ConstraintError> {
    let mut state = PhysicsState::from_positions(request.positions, request.surface_count, material);
    state.constraints = build_constraints(request, material, config)?;
    Ok(state)
}

/// Refresh rest lengths/angles and material-derived parameters in place.
///
/// Shape-matching offsets are left alone; see [`refresh_shape_matching`].
pub fn refresh_constraints(
    constraints: &mut [Constraint],
    topology: &Topology,
    positions: &[DVec3],
    material: &impl MaterialQuery,
    config: &PhysicsConfig,
) -> Result<(), ConstraintError> {
    validate_constraints(constraints, positions.len())?;
    let factor = density_factor(topology, positions, config.reference_edge_length);

    for constraint in constraints.iter_mut() {
        match constraint {
            Constraint::Distance { particles, tier, .. } | Constraint::Spring { particles, tier, .. } => {
                let (edge, tier) = (*particles, *tier);
                *constraint = edge_constraint(edge, positions, material, config, factor, tier);
            }
            Constraint::Dihedral { particles: [v0, v1, wa, wb], rest_angle, compliance } => {
                let m = midpoint_material(material, positions, &[*v0, *v1]);
                *rest_angle = dihedral_angle(positions[*v0], positions[*v1], positions[*wa], positions[*wb]);
                *compliance = compliance_for(m.stiffness * config.bending_scale * factor);
            }
            Constraint::Angle { particles: [a, v, b], rest_angle, compliance } => {
                let m = midpoint_material(material, positions, &[*a, *v, *b]);
                *rest_angle = vertex_angle(positions[*a], positions[*v], positions[*b]);
                *compliance = compliance_for(m.stiffness * config.bending_scale * factor);
            }
            Constraint::ShapeMatch { stiffness, .. } => {
                *stiffness = config.shape_matching_stiffness;
            }
        }
    }
    trace!("refresh_constraints: {} constraints, density factor {:.3}", constraints.len(), factor);
    validate_constraints(constraints, positions.len())
}

/// Recompute shape-matching offsets against new ideal positions.
///
/// Returns the number of constraints updated.
pub fn refresh_shape_matching(
    constraints: &mut [Constraint],
    targets: &[DVec3],
    masses: &[f64],
    internal: Range<usize>,
) -> usize {
    let centroid = weighted_centroid(targets, masses, internal);
    let mut updated = 0;
    for constraint in constraints.iter_mut() {
        if let Constraint::ShapeMatch { particle, rest_offset, .. } = constraint {
            if let Some(&target) = targets.get(*particle) {
                *rest_offset = target - centroid;
                updated += 1;
            }
        }
    }
    updated
}

fn invalid(constraint: usize, reason: &'static str) -> ConstraintError {
    ConstraintError::InvalidParameter { constraint, reason }
}

/// Check indices, parameter ranges and distance/spring exclusivity.
pub fn validate_constraints(constraints: &[Constraint], particle_count: usize) -> Result<(), ConstraintError> {
    // (has distance, has spring) per edge
    let mut edge_kinds: HashMap<[usize; 2], (bool, bool)> = HashMap::new();

    for (i, constraint) in constraints.iter().enumerate() {
        if let Some(&particle) = constraint.particles().iter().find(|&&p| p >= particle_count) {
            return Err(ConstraintError::ParticleOutOfRange {
                constraint: i,
                particle,
                count: particle_count,
            });
        }

        match constraint {
            Constraint::Distance { rest_length, compliance, .. } => {
                if !(rest_length.is_finite() && *rest_length >= 0.0) {
                    return Err(invalid(i, "rest length must be finite and non-negative"));
                }
                if !(compliance.is_finite() && *compliance >= 0.0) {
                    return Err(invalid(i, "compliance must be finite and non-negative"));
                }
            }
            Constraint::Spring { rest_length, stiffness, damping, .. } => {
                if !(rest_length.is_finite() && *rest_length >= 0.0) {
                    return Err(invalid(i, "rest length must be finite and non-negative"));
                }
                if !(stiffness.is_finite() && *stiffness > 0.0) {
                    return Err(invalid(i, "spring stiffness must be finite and positive"));
                }
                if !(damping.is_finite() && *damping >= 0.0) {
                    return Err(invalid(i, "spring damping must be finite and non-negative"));
                }
            }
            Constraint::Dihedral { rest_angle, compliance, .. } | Constraint::Angle { rest_angle, compliance, .. } => {
                if !rest_angle.is_finite() {
                    return Err(invalid(i, "rest angle must be finite"));
                }
                if !(compliance.is_finite() && *compliance >= 0.0) {
                    return Err(invalid(i, "compliance must be finite and non-negative"));
                }
            }
            Constraint::ShapeMatch { rest_offset, stiffness, .. } => {
                if !rest_offset.is_finite() {
                    return Err(invalid(i, "shape-matching offset must be finite"));
                }
                if !(0.0..=1.0).contains(stiffness) {
                    return Err(invalid(i, "shape-matching stiffness must be in [0, 1]"));
                }
            }
        }

        if let Some(edge) = constraint.edge() {
            let kinds = edge_kinds.entry(edge).or_insert((false, false));
            match constraint {
                Constraint::Distance { .. } => kinds.0 = true,
                Constraint::Spring { .. } => kinds.1 = true,
                _ => {}
            }
            if kinds.0 && kinds.1 {
                return Err(ConstraintError::ConflictingEdge { a: edge[0], b: edge[1] });
            }
        }
    }
    Ok(())
}
