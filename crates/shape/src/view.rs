//! Borrowed physics access for an external integrator.

use std::ops::Range;

use constraints::{Constraint, Particle};

use crate::error::ShapeError;
use crate::state::ShapeState;

/// Mutable window onto a shape's particles.
///
/// While a view exists (and until it is committed) every other mutation of
/// the shape fails with [`ShapeError::PendingCommit`]. Dropping a view
/// without committing leaves the shape locked until
/// [`ShapeState::commit_physics`] is called.
#[derive(Debug)]
pub struct PhysicsView<'a> {
    state: &'a mut ShapeState,
}

impl<'a> PhysicsView<'a> {
    pub(crate) fn new(state: &'a mut ShapeState) -> Self {
        Self { state }
    }

    pub fn particles(&self) -> &[Particle] {
        self.state.physics().map_or(&[][..], |p| p.particles.as_slice())
    }

    pub fn particles_mut(&mut self) -> Result<&mut [Particle], ShapeError> {
        Ok(self.state.discrete_physics_mut()?.particles.as_mut_slice())
    }

    pub fn constraints(&self) -> &[Constraint] {
        self.state.physics().map_or(&[][..], |p| p.constraints.as_slice())
    }

    pub fn surface_range(&self) -> Range<usize> {
        self.state.physics().map_or(0..0, |p| p.surface_range())
    }

    pub fn internal_range(&self) -> Range<usize> {
        self.state.physics().map_or(0..0, |p| p.internal_range())
    }

    /// Write surface particles back into the shape and release the lock.
    pub fn commit(self) -> Result<(), ShapeError> {
        self.state.commit_physics()
    }
}
