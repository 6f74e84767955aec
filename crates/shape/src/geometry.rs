//! Derived geometry and its cache.
//!
//! Values are computed on demand and kept until the surface version moves
//! or a structural change clears the cache. Plane sections are keyed by the
//! plane quantized to a 1e-6 grid, so nearly identical planes share an
//! entry.

use std::collections::HashMap;
use std::f64::consts::PI;

use glam::DVec3;

/// Plane coordinates are rounded to multiples of this for cache keys.
pub const PLANE_KEY_RESOLUTION: f64 = 1e-6;

/// Quantized `(normal, offset)` plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey([i64; 4]);

impl PlaneKey {
    pub fn new(normal: DVec3, offset: f64) -> Self {
        let n = normal.normalize_or_zero();
        let q = |v: f64| (v / PLANE_KEY_RESOLUTION).round() as i64;
        Self([q(n.x), q(n.y), q(n.z), q(offset)])
    }
}

/// Segment where a triangle crosses a plane.
pub type Segment = [DVec3; 2];

/// Cached volume, area and plane sections for one surface version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryCache {
    surface_version: Option<u64>,
    volume: Option<f64>,
    surface_area: Option<f64>,
    sections: HashMap<PlaneKey, Vec<Segment>>,
}

impl GeometryCache {
    /// Drop everything if the cache was filled for another surface version.
    pub fn sync(&mut self, surface_version: u64) {
        if self.surface_version != Some(surface_version) {
            self.clear();
            self.surface_version = Some(surface_version);
        }
    }

    pub fn clear(&mut self) {
        self.surface_version = None;
        self.volume = None;
        self.surface_area = None;
        self.sections.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_none() && self.surface_area.is_none() && self.sections.is_empty()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn volume_or_insert_with(&mut self, compute: impl FnOnce() -> f64) -> f64 {
        *self.volume.get_or_insert_with(compute)
    }

    pub fn surface_area_or_insert_with(&mut self, compute: impl FnOnce() -> f64) -> f64 {
        *self.surface_area.get_or_insert_with(compute)
    }

    pub fn section_or_insert_with(&mut self, key: PlaneKey, compute: impl FnOnce() -> Vec<Segment>) -> &[Segment] {
        self.sections.entry(key).or_insert_with(compute)
    }
}

/// Signed volume enclosed by outward-wound `triangles`, measured from
/// `origin`.
pub fn mesh_volume(points: &[DVec3], triangles: &[[usize; 3]], origin: DVec3) -> f64 {
    triangles
        .iter()
        .map(|&[a, b, c]| {
            let (pa, pb, pc) = (points[a] - origin, points[b] - origin, points[c] - origin);
            pa.dot(pb.cross(pc)) / 6.0
        })
        .sum()
}

pub fn mesh_area(points: &[DVec3], triangles: &[[usize; 3]]) -> f64 {
    triangles
        .iter()
        .map(|&[a, b, c]| (points[b] - points[a]).cross(points[c] - points[a]).length() * 0.5)
        .sum()
}

/// Shoelace area of a closed outline projected onto the XY plane.
pub fn outline_area(points: &[DVec3]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() * 0.5
}

/// Volume of a star-shaped body by quadrature over unit `directions`.
pub fn radial_volume(directions: &[DVec3], radius: impl Fn(DVec3) -> f64) -> f64 {
    if directions.is_empty() {
        return 0.0;
    }
    let weight = 4.0 * PI / directions.len() as f64;
    directions.iter().map(|&d| radius(d).powi(3) / 3.0).sum::<f64>() * weight
}

/// Area of a star-shaped body ignoring surface slope; exact for spheres.
pub fn radial_area(directions: &[DVec3], radius: impl Fn(DVec3) -> f64) -> f64 {
    if directions.is_empty() {
        return 0.0;
    }
    let weight = 4.0 * PI / directions.len() as f64;
    directions.iter().map(|&d| radius(d).powi(2)).sum::<f64>() * weight
}

/// Segments where `triangles` cross the plane `normal · p = offset`.
pub fn plane_section(points: &[DVec3], triangles: &[[usize; 3]], normal: DVec3, offset: f64) -> Vec<Segment> {
    let normal = normal.normalize_or_zero();
    if normal == DVec3::ZERO {
        return Vec::new();
    }

    let mut segments = Vec::new();
    for tri in triangles {
        let corners = tri.map(|i| points[i]);
        let dist = corners.map(|p| normal.dot(p) - offset);
        let mut crossing = Vec::with_capacity(2);
        for (i, j) in [(0, 1), (1, 2), (2, 0)] {
            if (dist[i] > 0.0) != (dist[j] > 0.0) {
                let t = dist[i] / (dist[i] - dist[j]);
                crossing.push(corners[i].lerp(corners[j], t));
            }
        }
        if let [a, b] = crossing[..] {
            segments.push([a, b]);
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Outward-wound unit cube, 12 triangles.
    fn cube() -> (Vec<DVec3>, Vec<[usize; 3]>) {
        let points = (0..8)
            .map(|i| DVec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
            .collect();
        let triangles = vec![
            [0, 2, 1], [1, 2, 3], // z = 0
            [4, 5, 6], [5, 7, 6], // z = 1
            [0, 1, 4], [1, 5, 4], // y = 0
            [2, 6, 3], [3, 6, 7], // y = 1
            [0, 4, 2], [2, 4, 6], // x = 0
            [1, 3, 5], [3, 7, 5], // x = 1
        ];
        (points, triangles)
    }

    #[test]
    fn test_cube_volume_and_area() {
        let (points, triangles) = cube();
        assert_relative_eq!(mesh_volume(&points, &triangles, DVec3::splat(0.5)), 1.0, epsilon = 1e-12);
        assert_relative_eq!(mesh_volume(&points, &triangles, DVec3::ZERO), 1.0, epsilon = 1e-12);
        assert_relative_eq!(mesh_area(&points, &triangles), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_outline_area() {
        let square = [DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::Y];
        assert_relative_eq!(outline_area(&square), 1.0);
        assert_eq!(outline_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_radial_quadrature_on_sphere() {
        let directions = fitting::basis::spherical_harmonics::fibonacci_directions(500);
        assert_relative_eq!(radial_volume(&directions, |_| 2.0), 32.0 * PI / 3.0, epsilon = 1e-9);
        assert_relative_eq!(radial_area(&directions, |_| 1.0), 4.0 * PI, epsilon = 1e-9);
    }

    #[test]
    fn test_plane_section_of_cube() {
        let (points, triangles) = cube();
        let segments = plane_section(&points, &triangles, DVec3::Z, 0.5);
        // Two triangles per side face
        assert_eq!(segments.len(), 8);
        for [a, b] in segments {
            assert_relative_eq!(a.z, 0.5, epsilon = 1e-12);
            assert_relative_eq!(b.z, 0.5, epsilon = 1e-12);
        }
        assert!(plane_section(&points, &triangles, DVec3::ZERO, 0.5).is_empty());
    }

    #[test]
    fn test_cache_tracks_surface_version() {
        let mut cache = GeometryCache::default();
        cache.sync(1);
        assert_eq!(cache.volume_or_insert_with(|| 2.0), 2.0);
        assert_eq!(cache.volume_or_insert_with(|| 3.0), 2.0);
        cache.section_or_insert_with(PlaneKey::new(DVec3::Z, 0.0), Vec::new);
        assert_eq!(cache.section_count(), 1);

        cache.sync(1);
        assert!(!cache.is_empty());
        cache.sync(2);
        assert!(cache.is_empty());
        assert_eq!(cache.volume_or_insert_with(|| 3.0), 3.0);
    }

    #[test]
    fn test_plane_key_quantization() {
        let a = PlaneKey::new(DVec3::new(0.0, 0.0, 2.0), 0.5);
        let b = PlaneKey::new(DVec3::Z, 0.5 + 1e-9);
        assert_eq!(a, b);
        assert_ne!(a, PlaneKey::new(DVec3::Z, 0.5 + 1e-5));
    }
}
