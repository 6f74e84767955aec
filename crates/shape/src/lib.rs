//! Shape state for Morpho deformable shapes.
//!
//! A shape is edited through sparse control points, fitted to a smooth
//! representation, and sampled into surface (and internal) points that an
//! external position-based solver simulates:
//! - [`point`] - Pod points, stable ids and the swap-to-end slot arena
//! - [`representation`] - Tagged shape models with topology and physics
//! - [`boundary`] - Outline ray casting and the ideal-radius query
//! - [`geometry`] - Volume, area and plane sections behind a versioned cache
//! - [`mode`] - Parametric/discrete mode and version counters
//! - [`state`] - [`ShapeState`], the edit/fit/rebuild orchestration
//! - [`view`] - Borrowed physics access with an explicit commit
//! - [`persist`] - JSON snapshots
//!
//! # Features
//!
//! - `parallel` - Parallel packing and triangulation passes (see `meshing`)
//! - `bevy` - Derives `Resource` on the shape config

pub mod boundary;
pub mod error;
pub mod geometry;
pub mod mode;
pub mod persist;
pub mod point;
pub mod representation;
pub mod state;
pub mod view;

pub use boundary::{IdealShape, OutlineBoundary};
pub use error::ShapeError;
pub use geometry::{GeometryCache, PlaneKey, Segment};
pub use mode::{Mode, Versions};
pub use persist::ShapeSnapshot;
pub use point::{Point, PointId, PointSlots, SlotEdit};
pub use representation::{
    EfdCoefficients, Representation, ShCoefficients, ShapeKind, ShapeModel, VolumeSource, VolumeSourceKind,
};
pub use state::ShapeState;
pub use view::PhysicsView;

pub use morpho_config::ShapeConfig;
