//! Tagged shape representations.
//!
//! [`ShapeModel`] is a closed enum: each variant carries exactly the
//! coefficients or payload its generator produced, and every consumer
//! matches on it exhaustively. [`Representation`] pairs the model with the
//! topology, physics state and geometry cache derived from it.

use constraints::PhysicsState;
use fitting::basis::elliptic_fourier;
use glam::{DVec2, DVec3};
use meshing::Topology;
use morpho_config::ShapeConfig;
use serde::{Deserialize, Serialize};

use crate::boundary::{IdealShape, OutlineBoundary};
use crate::geometry::GeometryCache;

/// Fitted spherical-harmonics radial function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShCoefficients {
    pub order: usize,
    pub coefficients: Vec<f64>,
}

/// Fitted elliptic-Fourier outline in the plane `z = plane_z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfdCoefficients {
    pub order: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub plane_z: f64,
}

impl EfdCoefficients {
    pub fn outline(&self, samples: usize) -> Vec<DVec2> {
        elliptic_fourier::sample_outline(&self.x, &self.y, samples)
    }

    /// Outline samples lifted into 3-D.
    pub fn outline_points(&self, samples: usize) -> Vec<DVec3> {
        self.outline(samples).into_iter().map(|p| p.extend(self.plane_z)).collect()
    }
}

/// Fitted body a volumetric representation is packed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VolumeSource {
    SphericalHarmonics(ShCoefficients),
    EllipticFourier2D(EfdCoefficients),
}

/// Representation payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeModel {
    /// Surface points copy the control points
    Points,
    SphericalHarmonics(ShCoefficients),
    EllipticFourier2D(EfdCoefficients),
    Volumetric {
        source: VolumeSource,
        /// Packed internal points, following the surface points in physics
        internal: Vec<DVec3>,
    },
    Cloth { columns: usize, rows: usize },
    Line,
}

/// Which volume source to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSourceKind {
    SphericalHarmonics,
    EllipticFourier2D,
}

/// Representation requested from `ShapeState::generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Points,
    SphericalHarmonics,
    EllipticFourier2D,
    Volumetric(VolumeSourceKind),
    Cloth,
    Line,
}

impl ShapeModel {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Points => ShapeKind::Points,
            Self::SphericalHarmonics(_) => ShapeKind::SphericalHarmonics,
            Self::EllipticFourier2D(_) => ShapeKind::EllipticFourier2D,
            Self::Volumetric { source: VolumeSource::SphericalHarmonics(_), .. } => {
                ShapeKind::Volumetric(VolumeSourceKind::SphericalHarmonics)
            }
            Self::Volumetric { source: VolumeSource::EllipticFourier2D(_), .. } => {
                ShapeKind::Volumetric(VolumeSourceKind::EllipticFourier2D)
            }
            Self::Cloth { .. } => ShapeKind::Cloth,
            Self::Line => ShapeKind::Line,
        }
    }

    /// Whether topology follows surface-point order (rings, chains, grids).
    pub fn ordered_surface(&self) -> bool {
        matches!(
            self,
            Self::EllipticFourier2D(_)
                | Self::Line
                | Self::Cloth { .. }
                | Self::Volumetric { source: VolumeSource::EllipticFourier2D(_), .. }
        )
    }

    /// Internal points for volumetric models, empty otherwise.
    pub fn internal_points(&self) -> &[DVec3] {
        match self {
            Self::Volumetric { internal, .. } => internal,
            _ => &[],
        }
    }

    /// Spherical-harmonics coefficients, directly or as a volume source.
    pub fn sh(&self) -> Option<&ShCoefficients> {
        match self {
            Self::SphericalHarmonics(sh)
            | Self::Volumetric { source: VolumeSource::SphericalHarmonics(sh), .. } => Some(sh),
            _ => None,
        }
    }

    /// Elliptic-Fourier coefficients, directly or as a volume source.
    pub fn efd(&self) -> Option<&EfdCoefficients> {
        match self {
            Self::EllipticFourier2D(efd)
            | Self::Volumetric { source: VolumeSource::EllipticFourier2D(efd), .. } => Some(efd),
            _ => None,
        }
    }

    /// Ideal-radius query about `center`, for fitted models only.
    pub fn ideal_shape(&self, center: DVec3, config: &ShapeConfig) -> Option<IdealShape<'_>> {
        let min_radius = config.fitting.min_radius;
        if let Some(sh) = self.sh() {
            return Some(IdealShape::Radial {
                coefficients: &sh.coefficients,
                min_radius,
            });
        }
        self.efd().map(|efd| {
            let half_thickness = match self {
                Self::Volumetric { .. } => config.topology.efd_half_thickness,
                _ => 0.0,
            };
            IdealShape::Outline(OutlineBoundary {
                center,
                outline: efd.outline(config.fitting.efd_samples),
                plane_z: efd.plane_z,
                half_thickness,
                min_radius,
            })
        })
    }

    /// Ideal radius along `direction`; `None` for models without one.
    pub fn ideal_radius(&self, direction: DVec3, center: DVec3, config: &ShapeConfig) -> Option<f64> {
        self.ideal_shape(center, config).map(|shape| shape.radius(direction))
    }
}

/// A model plus everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub model: ShapeModel,
    pub topology: Topology,
    /// Present once the physics topology has been built
    pub physics: Option<PhysicsState>,
    #[serde(skip)]
    pub cache: GeometryCache,
}

impl Representation {
    /// Fresh representation with unconnected vertices and no physics.
    pub fn new(model: ShapeModel, vertex_count: usize) -> Self {
        Self {
            model,
            topology: Topology::new(vertex_count),
            physics: None,
            cache: GeometryCache::default(),
        }
    }

    /// Copy without cached geometry, for persistence.
    pub fn without_cache(&self) -> Self {
        Self {
            cache: GeometryCache::default(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{PI, TAU};

    fn circle_efd(radius: f64) -> EfdCoefficients {
        EfdCoefficients {
            order: 1,
            x: vec![0.0, radius, 0.0],
            y: vec![0.0, 0.0, radius],
            plane_z: 0.25,
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        let model = ShapeModel::Volumetric {
            source: VolumeSource::EllipticFourier2D(circle_efd(1.0)),
            internal: vec![DVec3::ZERO],
        };
        assert_eq!(model.kind(), ShapeKind::Volumetric(VolumeSourceKind::EllipticFourier2D));
        assert_eq!(model.internal_points().len(), 1);
        assert!(model.efd().is_some() && model.sh().is_none());
        assert_eq!(ShapeModel::Line.kind(), ShapeKind::Line);
        assert!(ShapeModel::Points.internal_points().is_empty());
    }

    #[test]
    fn test_ideal_radius_per_model() {
        let config = ShapeConfig::default();
        let sphere = ShapeModel::SphericalHarmonics(ShCoefficients {
            order: 0,
            coefficients: vec![(4.0 * PI).sqrt()],
        });
        assert_abs_diff_eq!(sphere.ideal_radius(DVec3::X, DVec3::ZERO, &config).unwrap(), 1.0, epsilon = 1e-12);

        let circle = ShapeModel::EllipticFourier2D(circle_efd(2.0));
        let r = circle.ideal_radius(DVec3::Y, DVec3::ZERO, &config).unwrap();
        // Polygon through 64 samples: between inscribed and circumscribed radius
        assert!(r <= 2.0 + 1e-12 && r >= 2.0 * (PI / 64.0).cos() - 1e-12);

        assert!(ShapeModel::Cloth { columns: 2, rows: 2 }.ideal_radius(DVec3::X, DVec3::ZERO, &config).is_none());
    }

    #[test]
    fn test_outline_points_lift_to_plane() {
        let efd = circle_efd(1.0);
        let points = efd.outline_points(8);
        assert_eq!(points.len(), 8);
        assert_abs_diff_eq!(points[2].y, (TAU * 2.0 / 8.0).sin(), epsilon = 1e-12);
        assert!(points.iter().all(|p| p.z == 0.25));
    }

    #[test]
    fn test_serde_skips_cache() {
        let mut rep = Representation::new(ShapeModel::Line, 3);
        rep.cache.sync(4);
        rep.cache.volume_or_insert_with(|| 1.0);
        let json = serde_json::to_string(&rep).unwrap();
        let parsed: Representation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rep.without_cache());
    }
}
