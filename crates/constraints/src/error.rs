//! Error types for constraint generation.

/// Errors raised while building or validating a constraint set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintError {
    #[error("Constraint {constraint} references particle {particle}, but only {count} exist")]
    ParticleOutOfRange {
        constraint: usize,
        particle: usize,
        count: usize,
    },

    #[error("Edge ({a}, {b}) carries both a distance and a spring constraint")]
    ConflictingEdge { a: usize, b: usize },

    #[error("Constraint {constraint} has an invalid parameter: {reason}")]
    InvalidParameter { constraint: usize, reason: &'static str },

    #[error("Particle ranges {surface:?} (surface) and {internal:?} (internal) do not partition {count} particles")]
    InvalidRange {
        surface: std::ops::Range<usize>,
        internal: std::ops::Range<usize>,
        count: usize,
    },

    #[error("Position count mismatch: topology has {expected} vertices, got {found} positions")]
    PositionCountMismatch { expected: usize, found: usize },
}
