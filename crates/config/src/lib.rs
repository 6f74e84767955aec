//! Shared configuration for Morpho
//!
//! This crate is the single source of truth for every tunable used by the
//! fitting, meshing, constraint and shape crates. All sections deserialize
//! with defaults, so a partial JSON document only overrides what it names.

use serde::{Deserialize, Serialize};

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Default spherical-harmonics basis order
pub const DEFAULT_SH_ORDER: usize = 3;

/// Default elliptic-Fourier harmonic count
pub const DEFAULT_EFD_ORDER: usize = 6;

/// Smallest radius shape evaluation may return
pub const DEFAULT_MIN_RADIUS: f64 = 1e-3;

/// Default seed for bubble-packing scatter
pub const DEFAULT_PACKING_SEED: u64 = 0x5eed_b0b1;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Material response at a point.
///
/// The uniform default is `{ stiffness: 1000, damping: 10, mass: 1 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            stiffness: 1000.0,
            damping: 10.0,
            mass: 1.0,
        }
    }
}

/// Least-squares fitting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    /// Spherical-harmonics order L; the basis has (L+1)² columns
    pub sh_order: usize,
    /// Number of elliptic-Fourier harmonics; the basis has 2·order+1 columns
    pub efd_order: usize,
    /// Floor applied to any non-positive or non-finite evaluated radius
    pub min_radius: f64,
    /// Fibonacci directions sampled when generating an SH surface
    pub surface_samples: usize,
    /// Outline samples when generating an EFD surface
    pub efd_samples: usize,
    /// Reuse the fit stack for spherical-harmonics fits
    pub incremental: bool,
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            sh_order: DEFAULT_SH_ORDER,
            efd_order: DEFAULT_EFD_ORDER,
            min_radius: DEFAULT_MIN_RADIUS,
            surface_samples: 256,
            efd_samples: 64,
            incremental: true,
        }
    }
}

/// Bubble-packing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackingConfig {
    /// Number of points to place
    pub target_count: usize,
    /// Repulsion radius; pairs closer than this push apart
    pub spacing: f64,
    /// Relaxation rounds
    pub iterations: usize,
    /// Fraction of the accumulated repulsion applied per round
    pub damping: f64,
    /// Distance ratio above which a point is pulled toward the boundary
    pub surface_threshold: f64,
    /// Minimum share of points that must end up on the surface
    pub surface_ratio: f64,
    /// Rejection-sampling attempts per scattered point
    pub max_scatter_attempts: usize,
    /// Scatter box half-extent as a multiple of the shape extent
    pub box_padding: f64,
    /// RNG seed; identical seeds give identical packings
    pub seed: u64,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            target_count: 200,
            spacing: 0.1,
            iterations: 20,
            damping: 0.5,
            surface_threshold: 0.92,
            surface_ratio: 0.3,
            max_scatter_attempts: 32,
            box_padding: 1.05,
            seed: DEFAULT_PACKING_SEED,
        }
    }
}

/// Topology construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Nearest neighbors considered per surface point when building triangles
    pub surface_neighbors: usize,
    /// Candidate triangles whose centroid sits below this fraction of the
    /// ideal radius are treated as occluded
    pub occlusion_ratio: f64,
    /// Nearest neighbors per internal point in the skeleton graph
    pub skeleton_neighbors: usize,
    /// Skeleton edge cutoff, in mean nearest-neighbor distances
    pub skeleton_distance_factor: f64,
    /// Skin-to-bone link cutoff, in mean nearest-neighbor distances
    pub link_distance_factor: f64,
    /// Half thickness of the slab packed for planar (EFD) volumes
    pub efd_half_thickness: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            surface_neighbors: 8,
            occlusion_ratio: 0.85,
            skeleton_neighbors: 6,
            skeleton_distance_factor: 2.0,
            link_distance_factor: 1.5,
            efd_half_thickness: 0.0,
        }
    }
}

/// Which constraint family the physics integrator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhysicsModel {
    /// Compliance-parametrized distance/angle constraints
    #[default]
    Xpbd,
    /// Stiffness/damping springs
    Spring,
}

/// Physics constraint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub model: PhysicsModel,
    /// Uniform material used when no material query is supplied
    pub material: Material,
    /// Average edge length at which the density factor reaches 1.0
    pub reference_edge_length: f64,
    /// Bending stiffness relative to structural stiffness
    pub bending_scale: f64,
    /// Shape-matching blend strength in [0, 1]
    pub shape_matching_stiffness: f64,
    /// Cloth grid columns
    pub cloth_columns: usize,
    /// Cloth grid rows
    pub cloth_rows: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            model: PhysicsModel::default(),
            material: Material::default(),
            reference_edge_length: 0.25,
            bending_scale: 0.1,
            shape_matching_stiffness: 0.5,
            cloth_columns: 4,
            cloth_rows: 4,
        }
    }
}

/// Top-level configuration for a shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct ShapeConfig {
    pub fitting: FittingConfig,
    pub packing: PackingConfig,
    pub topology: TopologyConfig,
    pub physics: PhysicsConfig,
    /// Log numerical clamps and fallbacks at warn level
    pub verbose: bool,
}

impl ShapeConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this configuration to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges that the algorithms rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fitting = &self.fitting;
        if !(fitting.min_radius > 0.0) {
            return Err(ConfigError::invalid("fitting.min_radius", "must be positive"));
        }
        if fitting.efd_order == 0 {
            return Err(ConfigError::invalid("fitting.efd_order", "must be at least 1"));
        }
        if fitting.surface_samples < 4 {
            return Err(ConfigError::invalid("fitting.surface_samples", "must be at least 4"));
        }
        if fitting.efd_samples < 4 {
            return Err(ConfigError::invalid("fitting.efd_samples", "must be at least 4"));
        }

        let packing = &self.packing;
        if packing.target_count == 0 {
            return Err(ConfigError::invalid("packing.target_count", "must be non-zero"));
        }
        if !(packing.spacing > 0.0) {
            return Err(ConfigError::invalid("packing.spacing", "must be positive"));
        }
        if !(packing.damping > 0.0 && packing.damping <= 1.0) {
            return Err(ConfigError::invalid("packing.damping", "must be in (0, 1]"));
        }
        if !(packing.surface_threshold > 0.0 && packing.surface_threshold < 1.0) {
            return Err(ConfigError::invalid(
                "packing.surface_threshold",
                "must be in (0, 1)",
            ));
        }
        if !(packing.surface_ratio > 0.0 && packing.surface_ratio <= 1.0) {
            return Err(ConfigError::invalid("packing.surface_ratio", "must be in (0, 1]"));
        }
        if packing.max_scatter_attempts == 0 {
            return Err(ConfigError::invalid(
                "packing.max_scatter_attempts",
                "must be non-zero",
            ));
        }

        let topology = &self.topology;
        if topology.surface_neighbors < 2 {
            return Err(ConfigError::invalid(
                "topology.surface_neighbors",
                "must be at least 2",
            ));
        }
        if topology.skeleton_neighbors == 0 {
            return Err(ConfigError::invalid(
                "topology.skeleton_neighbors",
                "must be non-zero",
            ));
        }
        if !(topology.occlusion_ratio > 0.0 && topology.occlusion_ratio <= 1.0) {
            return Err(ConfigError::invalid("topology.occlusion_ratio", "must be in (0, 1]"));
        }
        if topology.efd_half_thickness < 0.0 {
            return Err(ConfigError::invalid(
                "topology.efd_half_thickness",
                "must not be negative",
            ));
        }

        let physics = &self.physics;
        if !(physics.material.stiffness > 0.0) || !(physics.material.mass > 0.0) {
            return Err(ConfigError::invalid(
                "physics.material",
                "stiffness and mass must be positive",
            ));
        }
        if !(physics.reference_edge_length > 0.0) {
            return Err(ConfigError::invalid(
                "physics.reference_edge_length",
                "must be positive",
            ));
        }
        if physics.cloth_columns < 2 || physics.cloth_rows < 2 {
            return Err(ConfigError::invalid(
                "physics.cloth_columns/rows",
                "a cloth grid needs at least 2x2 particles",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ShapeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fitting.sh_order, DEFAULT_SH_ORDER);
        assert_eq!(config.physics.material, Material::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ShapeConfig::from_json_str(r#"{ "packing": { "target_count": 50 } }"#)
            .expect("partial config should parse");
        assert_eq!(config.packing.target_count, 50);
        assert_eq!(config.packing.spacing, 0.1);
        assert_eq!(config.topology.surface_neighbors, 8);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = ShapeConfig::default();
        config.physics.model = PhysicsModel::Spring;
        config.verbose = true;

        let json = config.to_json_string().unwrap();
        let parsed = ShapeConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.physics.model, PhysicsModel::Spring);
        assert!(parsed.verbose);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ShapeConfig::from_json_str(r#"{ "packing": { "spacing": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "packing.spacing", .. }));

        let err = ShapeConfig::from_json_str(r#"{ "physics": { "cloth_rows": 1 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        assert!(matches!(
            ShapeConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
