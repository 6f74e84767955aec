//! Physics constraint generation for Morpho shapes.
//!
//! The external position-based solver consumes what this crate produces:
//! - [`particle`] - Particles with cached spherical angles, and the
//!   surface/internal-partitioned [`PhysicsState`]
//! - [`constraint`] - Distance, spring, dihedral, angle and shape-matching
//!   constraints grouped into priority [`Tier`]s
//! - [`material`] - Per-position material lookup
//! - [`factory`] - Topology → constraints with density-normalized stiffness,
//!   in-place refresh and validation

pub mod constraint;
pub mod error;
pub mod factory;
pub mod material;
pub mod particle;

pub use constraint::{dihedral_angle, vertex_angle, Constraint, Tier};
pub use error::ConstraintError;
pub use factory::{
    build_constraints, build_physics, density_factor, refresh_constraints, refresh_shape_matching,
    validate_constraints, weighted_centroid, BendingSource, ConstraintRequest, TierCounts,
};
pub use material::MaterialQuery;
pub use particle::{uniform_particles, CachedAngles, Particle, PhysicsState};
