//! Physics particles and the particle/constraint aggregate.
//!
//! Particles are laid out surface first: `[surface_start, surface_start +
//! surface_count)` mirrors the shape's surface points index for index, and
//! the internal range follows it.

use std::ops::Range;

use glam::DVec3;
use morpho_config::Material;
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::error::ConstraintError;
use crate::material::MaterialQuery;

/// Radii below this have no usable direction.
const MIN_RADIUS: f64 = 1e-12;

/// Spherical position of a particle about the shape center.
///
/// `center_version` records which center the angles were taken against;
/// a stale tag means they must be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedAngles {
    pub theta: f64,
    pub phi: f64,
    /// Distance from the center over the ideal radius in that direction
    pub radial_fraction: f64,
    pub center_version: u64,
}

impl CachedAngles {
    /// Angles of `position` about `center`, with the radial fraction taken
    /// against `ideal_radius` along the same direction.
    pub fn compute(
        position: DVec3,
        center: DVec3,
        center_version: u64,
        ideal_radius: impl Fn(DVec3) -> f64,
    ) -> Self {
        let offset = position - center;
        let r = offset.length();
        let (theta, phi, dir) = if r < MIN_RADIUS {
            (0.0, 0.0, DVec3::Z)
        } else {
            ((offset.z / r).clamp(-1.0, 1.0).acos(), offset.y.atan2(offset.x), offset / r)
        };
        let ideal = ideal_radius(dir);
        let radial_fraction = if ideal > MIN_RADIUS { r / ideal } else { 0.0 };
        Self {
            theta,
            phi,
            radial_fraction,
            center_version,
        }
    }

    /// Unit direction for the cached angles.
    pub fn direction(&self) -> DVec3 {
        let (st, ct) = self.theta.sin_cos();
        let (sp, cp) = self.phi.sin_cos();
        DVec3::new(st * cp, st * sp, ct)
    }
}

/// A simulated point mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: DVec3,
    pub previous: DVec3,
    pub velocity: DVec3,
    pub mass: f64,
    /// Zero for fixed particles
    pub inverse_mass: f64,
    pub fixed: bool,
    pub cached_angles: Option<CachedAngles>,
}

impl Particle {
    pub fn new(position: DVec3, mass: f64) -> Self {
        let mut particle = Self {
            position,
            previous: position,
            velocity: DVec3::ZERO,
            mass,
            inverse_mass: 0.0,
            fixed: false,
            cached_angles: None,
        };
        particle.set_mass(mass);
        particle
    }

    /// Set the mass, keeping fixed particles immovable.
    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
        self.inverse_mass = if self.fixed || !(mass > 0.0) || !mass.is_finite() {
            0.0
        } else {
            1.0 / mass
        };
    }

    /// Pin or release the particle.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
        self.set_mass(self.mass);
    }

    /// Move to `position` without injecting velocity.
    pub fn teleport(&mut self, position: DVec3) {
        self.position = position;
        self.previous = position;
    }

    /// Cached angles for `center_version`, recomputing a stale or missing tag.
    pub fn angles(
        &mut self,
        center: DVec3,
        center_version: u64,
        ideal_radius: impl Fn(DVec3) -> f64,
    ) -> CachedAngles {
        match self.cached_angles {
            Some(angles) if angles.center_version == center_version => angles,
            _ => {
                let angles = CachedAngles::compute(self.position, center, center_version, ideal_radius);
                self.cached_angles = Some(angles);
                angles
            }
        }
    }
}

/// Particles and constraints handed to an external integrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    pub particles: Vec<Particle>,
    pub constraints: Vec<Constraint>,
    pub surface_start: usize,
    pub surface_count: usize,
    pub internal_start: usize,
    pub internal_count: usize,
}

impl PhysicsState {
    /// Particles for `positions`, the first `surface_count` being surface.
    pub fn from_positions(positions: &[DVec3], surface_count: usize, material: &impl MaterialQuery) -> Self {
        let surface_count = surface_count.min(positions.len());
        let particles = positions
            .iter()
            .map(|&p| Particle::new(p, material.material_at(p).mass))
            .collect();
        Self {
            particles,
            constraints: Vec::new(),
            surface_start: 0,
            surface_count,
            internal_start: surface_count,
            internal_count: positions.len() - surface_count,
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn surface_range(&self) -> Range<usize> {
        self.surface_start..self.surface_start.saturating_add(self.surface_count)
    }

    pub fn internal_range(&self) -> Range<usize> {
        self.internal_start..self.internal_start.saturating_add(self.internal_count)
    }

    /// Both ranges lie inside the particle array and do not overlap.
    pub fn check_ranges(&self) -> Result<(), ConstraintError> {
        let (surface, internal) = (self.surface_range(), self.internal_range());
        let count = self.particle_count();
        let overlap = !surface.is_empty() && !internal.is_empty() && surface.start < internal.end && internal.start < surface.end;
        if surface.end > count || internal.end > count || overlap {
            return Err(ConstraintError::InvalidRange { surface, internal, count });
        }
        Ok(())
    }

    /// Current particle positions.
    pub fn positions(&self) -> Vec<DVec3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    pub fn masses(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.mass).collect()
    }

    /// Re-read masses from a material, keeping fixed flags.
    pub fn apply_material(&mut self, material: &impl MaterialQuery) {
        for particle in &mut self.particles {
            let mass = material.material_at(particle.position).mass;
            particle.set_mass(mass);
        }
    }

    /// Drop every cached angle set.
    pub fn clear_cached_angles(&mut self) {
        for particle in &mut self.particles {
            particle.cached_angles = None;
        }
    }
}

/// Particle set for a uniform material.
pub fn uniform_particles(positions: &[DVec3], surface_count: usize, material: Material) -> PhysicsState {
    PhysicsState::from_positions(positions, surface_count, &material)
}
