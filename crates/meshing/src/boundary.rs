//! Boundary and occlusion tests supplied by a shape.
//!
//! The packer and triangulator only see a shape through these traits:
//! - [`BoundaryTest`] - inside/outside classification plus a projection
//!   onto the boundary
//! - [`OcclusionTest`] - whether a candidate triangle centroid is hidden
//!   inside the body
//!
//! Closures implement both traits, and [`RadialBoundary`] /
//! [`RadialOcclusion`] build them from any star-shaped ideal-radius
//! function.

use glam::DVec3;

/// Directions shorter than this are treated as sitting on the center.
const MIN_DIRECTION: f64 = 1e-12;

/// Result of testing one position against a boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundarySample {
    pub inside: bool,
    /// Closest boundary point along the ray from the shape center
    pub projected: DVec3,
    /// Position lies on the boundary within tolerance
    pub surface: bool,
    /// Distance from the center as a fraction of the boundary distance
    pub distance_ratio: f64,
}

/// Classifies positions against a closed boundary.
pub trait BoundaryTest {
    fn test(&self, position: DVec3) -> BoundarySample;
}

impl<F> BoundaryTest for F
where
    F: Fn(DVec3) -> BoundarySample,
{
    fn test(&self, position: DVec3) -> BoundarySample {
        self(position)
    }
}

/// Line-of-sight test for candidate surface triangles.
pub trait OcclusionTest {
    /// `true` when `centroid` is buried inside the body.
    fn is_occluded(&self, centroid: DVec3) -> bool;
}

impl<F> OcclusionTest for F
where
    F: Fn(DVec3) -> bool,
{
    fn is_occluded(&self, centroid: DVec3) -> bool {
        self(centroid)
    }
}

/// Unit direction from `center` to `position`, `+Z` at the center itself.
pub fn radial_direction(position: DVec3, center: DVec3) -> (DVec3, f64) {
    let offset = position - center;
    let distance = offset.length();
    if distance < MIN_DIRECTION || !distance.is_finite() {
        (DVec3::Z, 0.0)
    } else {
        (offset / distance, distance)
    }
}

/// Boundary test for a star-shaped body given its ideal radius per direction.
#[derive(Debug, Clone, Copy)]
pub struct RadialBoundary<F> {
    pub center: DVec3,
    /// Ratios within this of 1.0 count as on the surface
    pub surface_tolerance: f64,
    pub ideal_radius: F,
}

impl<F> RadialBoundary<F>
where
    F: Fn(DVec3) -> f64,
{
    pub fn new(center: DVec3, ideal_radius: F) -> Self {
        Self {
            center,
            surface_tolerance: 1e-6,
            ideal_radius,
        }
    }
}

impl<F> BoundaryTest for RadialBoundary<F>
where
    F: Fn(DVec3) -> f64,
{
    fn test(&self, position: DVec3) -> BoundarySample {
        let (dir, distance) = radial_direction(position, self.center);
        let ideal = (self.ideal_radius)(dir);
        let ratio = if ideal > 0.0 { distance / ideal } else { f64::INFINITY };
        BoundarySample {
            inside: ratio <= 1.0,
            projected: self.center + dir * ideal.max(0.0),
            surface: (ratio - 1.0).abs() <= self.surface_tolerance,
            distance_ratio: ratio,
        }
    }
}

/// Occlusion test: a centroid closer to the center than `ratio × ideal`
/// is buried.
#[derive(Debug, Clone, Copy)]
pub struct RadialOcclusion<F> {
    pub center: DVec3,
    pub ratio: f64,
    pub ideal_radius: F,
}

impl<F> OcclusionTest for RadialOcclusion<F>
where
    F: Fn(DVec3) -> f64,
{
    fn is_occluded(&self, centroid: DVec3) -> bool {
        let (dir, distance) = radial_direction(centroid, self.center);
        distance < self.ratio * (self.ideal_radius)(dir)
    }
}

/// Sphere boundary, mostly useful for tests and previews.
pub fn sphere_boundary(center: DVec3, radius: f64) -> RadialBoundary<impl Fn(DVec3) -> f64 + Copy> {
    RadialBoundary::new(center, move |_: DVec3| radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sphere_boundary_inside_and_outside() {
        let boundary = sphere_boundary(DVec3::ZERO, 2.0);

        let inner = boundary.test(DVec3::new(1.0, 0.0, 0.0));
        assert!(inner.inside);
        assert!(!inner.surface);
        assert_abs_diff_eq!(inner.distance_ratio, 0.5);
        assert_abs_diff_eq!(inner.projected.x, 2.0);

        let outer = boundary.test(DVec3::new(0.0, 3.0, 0.0));
        assert!(!outer.inside);
        assert_abs_diff_eq!(outer.projected.y, 2.0);

        let on = boundary.test(DVec3::new(0.0, 0.0, -2.0));
        assert!(on.inside && on.surface);
    }

    #[test]
    fn test_center_maps_to_fallback_direction() {
        let boundary = sphere_boundary(DVec3::ONE, 1.0);
        let sample = boundary.test(DVec3::ONE);
        assert!(sample.inside);
        assert_eq!(sample.distance_ratio, 0.0);
        assert_abs_diff_eq!(sample.projected.z, 2.0);
    }

    #[test]
    fn test_closures_implement_traits() {
        let occlusion = |c: DVec3| c.length() < 0.5;
        assert!(occlusion.is_occluded(DVec3::ZERO));
        assert!(!occlusion.is_occluded(DVec3::X));

        let boundary = |p: DVec3| BoundarySample {
            inside: p.x < 0.0,
            projected: DVec3::new(0.0, p.y, p.z),
            surface: p.x == 0.0,
            distance_ratio: 1.0 + p.x,
        };
        assert!(boundary.test(DVec3::NEG_X).inside);
    }

    #[test]
    fn test_radial_occlusion() {
        let occlusion = RadialOcclusion {
            center: DVec3::ZERO,
            ratio: 0.85,
            ideal_radius: |_: DVec3| 1.0,
        };
        assert!(occlusion.is_occluded(DVec3::new(0.5, 0.0, 0.0)));
        assert!(!occlusion.is_occluded(DVec3::new(0.0, 0.9, 0.0)));
    }
}
