//! Volumetric meshing for Morpho shapes.
//!
//! This crate turns a boundary description into packed points and their
//! connectivity:
//! - [`boundary`] - Boundary and occlusion traits supplied per shape type
//! - [`spatial`] - Point octree with radius and k-nearest queries
//! - [`packing`] - Bubble packing with surface/internal classification
//! - [`triangulation`] - Outward-facing surface triangles from k-NN candidates
//! - [`skeleton`] - Internal skeleton graph and skin-to-bone links
//! - [`topology`] - Triangles, edges, edge ownership and adjacency
//!
//! # Features
//!
//! - `parallel` - Runs the repulsion and candidate-triangle passes on rayon.
//!   Output is identical to the sequential build for the same seed.

pub mod boundary;
pub mod error;
pub mod packing;
pub mod skeleton;
pub mod spatial;
pub mod topology;
pub mod triangulation;

pub use boundary::{
    radial_direction, sphere_boundary, BoundarySample, BoundaryTest, OcclusionTest, RadialBoundary,
    RadialOcclusion,
};
pub use error::MeshError;
pub use packing::{pack_bubbles, PackingResult, PackingStats};
pub use skeleton::{assemble_volume, build_links, build_skeleton, mean_nearest_neighbor_distance, VolumeStats};
pub use spatial::{Aabb, PointOctree};
pub use topology::{InteriorEdge, Topology};
pub use triangulation::triangulate_surface;
