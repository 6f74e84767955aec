//! Mode state machine and version counters.

use serde::{Deserialize, Serialize};

/// Whether physics access is granted.
///
/// `Discrete` is entered only by rebuilding the physics topology; any
/// regeneration drops back to `Parametric`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Fit only; physics state is absent or stale
    #[default]
    Parametric,
    /// Physics state is current and may be viewed
    Discrete,
    /// Reserved
    Hybrid,
}

/// Monotonic counters compared on read to invalidate caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Versions {
    pub control: u64,
    pub surface: u64,
    pub center: u64,
}

impl Versions {
    pub fn bump_control(&mut self) -> u64 {
        self.control += 1;
        self.control
    }

    pub fn bump_surface(&mut self) -> u64 {
        self.surface += 1;
        self.surface
    }

    pub fn bump_center(&mut self) -> u64 {
        self.center += 1;
        self.center
    }
}
