use constraints::ConstraintError;
use fitting::FitError;
use meshing::MeshError;
use morpho_config::ConfigError;
use thiserror::Error;

use crate::mode::Mode;
use crate::point::PointId;

/// Errors raised by shape state operations.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to serialize shape: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Shape has no control points")]
    EmptyPointSet,

    #[error("Shape has no representation; call generate first")]
    NoRepresentation,

    #[error("Operation requires {expected:?} mode but shape is {found:?}; call rebuild_physics_topology first")]
    InvalidMode { expected: Mode, found: Mode },

    #[error("{what} count mismatch: expected {expected}, found {found}; call rebuild_physics_topology with force=true")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Physics state is missing; call rebuild_physics_topology with force=true")]
    MissingPhysics,

    #[error("A physics view is still open; call commit() on it first")]
    PendingCommit,

    #[error("Index {index} out of range for {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown or duplicate point id {0:?}")]
    InvalidPointId(PointId),
}
