//! Error types for fitting operations.

/// Errors that can occur while building or solving a least-squares system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Underdetermined system: {rows} rows for {cols} unknowns")]
    InsufficientRows { rows: usize, cols: usize },

    #[error("Insufficient points: {provided} provided, {required} required")]
    InsufficientPoints { provided: usize, required: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Singular matrix: |R[{index},{index}]| = {magnitude:e}")]
    Singular { index: usize, magnitude: f64 },

    #[error("QR state is not extendable (built by Householder); refactor with Givens")]
    NotExtendable,

    #[error("Degenerate boundary: total arc length {arc_length:e} is too small")]
    DegenerateBoundary { arc_length: f64 },

    #[error("Point set is empty")]
    EmptyPointSet,
}
