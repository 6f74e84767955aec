//! Error types for meshing operations.

/// Errors raised while packing points or assembling topology.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("Invalid meshing parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: &'static str },

    #[error("Vertex index {index} out of range for {count} vertices")]
    VertexOutOfRange { index: usize, count: usize },

    #[error("Degenerate element: repeated vertex {vertex}")]
    DegenerateElement { vertex: usize },

    #[error("Edge ({a}, {b}) is shared by {owners} triangles (at most 2 allowed)")]
    EdgeOverflow { a: usize, b: usize, owners: usize },

    #[error("Triangle {triangle} edge ({a}, {b}) is missing from the edge set")]
    MissingEdge { triangle: usize, a: usize, b: usize },
}
