//! Surface triangulation from k-nearest-neighbor candidates.
//!
//! For every surface point, each pair of its `k` nearest neighbors forms a
//! candidate triangle. A candidate survives when
//! - it is not degenerate (non-zero area, normal not tangent to the
//!   radial direction),
//! - after winding it outward (normal · (centroid - center) > 0),
//! - and its centroid is not occluded.
//!
//! Candidates are deduplicated by sorted-vertex key and accepted shortest
//! perimeter first; a triangle is skipped when one of its edges already has
//! two owners, so the result always satisfies the two-owner edge limit.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use glam::DVec3;
use morpho_config::TopologyConfig;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::boundary::OcclusionTest;
use crate::error::MeshError;
use crate::spatial::PointOctree;
use crate::topology::Topology;

/// Twice-area below this is a degenerate triangle.
const MIN_DOUBLE_AREA: f64 = 1e-12;

/// |cos| between normal and radial direction below this is edge-on.
const MIN_OUTWARD_COSINE: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: [usize; 3],
    triangle: [usize; 3],
    perimeter: f64,
}

fn sorted_key(mut tri: [usize; 3]) -> [usize; 3] {
    tri.sort_unstable();
    tri
}

fn edge_key(a: usize, b: usize) -> [usize; 2] {
    if a < b { [a, b] } else { [b, a] }
}

/// Outward-wound candidate `(i, j, k)`, or `None` when it is rejected.
fn make_candidate<O: OcclusionTest>(
    points: &[DVec3],
    center: DVec3,
    occlusion: &O,
    [i, j, k]: [usize; 3],
) -> Option<Candidate> {
    let (a, b, c) = (points[i], points[j], points[k]);
    let normal = (b - a).cross(c - a);
    let double_area = normal.length();
    if double_area < MIN_DOUBLE_AREA {
        return None;
    }

    let centroid = (a + b + c) / 3.0;
    let radial = centroid - center;
    let radial_len = radial.length();
    if radial_len < MIN_DOUBLE_AREA {
        return None;
    }
    let facing = normal.dot(radial) / (double_area * radial_len);
    if facing.abs() < MIN_OUTWARD_COSINE {
        return None;
    }
    if occlusion.is_occluded(centroid) {
        return None;
    }

    let triangle = if facing > 0.0 { [i, j, k] } else { [i, k, j] };
    Some(Candidate {
        key: sorted_key(triangle),
        triangle,
        perimeter: a.distance(b) + b.distance(c) + c.distance(a),
    })
}

fn candidates_for<O: OcclusionTest>(
    index: usize,
    points: &[DVec3],
    octree: &PointOctree,
    center: DVec3,
    occlusion: &O,
    neighbors: usize,
) -> Vec<Candidate> {
    let near: Vec<usize> = octree
        .k_nearest(points[index], neighbors, Some(index))
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    let mut out = Vec::new();
    for (n, &j) in near.iter().enumerate() {
        for &k in &near[n + 1..] {
            if let Some(candidate) = make_candidate(points, center, occlusion, [index, j, k]) {
                out.push(candidate);
            }
        }
    }
    out
}

/// Triangulate `points` (all on the surface) into an outward-facing mesh.
pub fn triangulate_surface<O>(
    points: &[DVec3],
    center: DVec3,
    occlusion: &O,
    config: &TopologyConfig,
) -> Result<Topology, MeshError>
where
    O: OcclusionTest + Sync,
{
    if config.surface_neighbors < 2 {
        return Err(MeshError::InvalidParameter {
            name: "surface_neighbors",
            reason: "must be at least 2",
        });
    }
    let start = Instant::now();
    let octree = PointOctree::from_points(points);

    #[cfg(feature = "parallel")]
    let per_point: Vec<Vec<Candidate>> = (0..points.len())
        .into_par_iter()
        .map(|i| candidates_for(i, points, &octree, center, occlusion, config.surface_neighbors))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let per_point: Vec<Vec<Candidate>> = (0..points.len())
        .map(|i| candidates_for(i, points, &octree, center, occlusion, config.surface_neighbors))
        .collect();

    // First occurrence of a key wins, so winding follows point order
    let mut unique: BTreeMap<[usize; 3], Candidate> = BTreeMap::new();
    let mut generated = 0;
    for candidate in per_point.into_iter().flatten() {
        generated += 1;
        unique.entry(candidate.key).or_insert(candidate);
    }

    let mut ordered: Vec<Candidate> = unique.into_values().collect();
    ordered.sort_by(|a, b| a.perimeter.total_cmp(&b.perimeter).then(a.key.cmp(&b.key)));

    let mut owners: HashMap<[usize; 2], u8> = HashMap::new();
    let mut triangles = Vec::new();
    for candidate in &ordered {
        let [a, b, c] = candidate.triangle;
        let edges = [edge_key(a, b), edge_key(b, c), edge_key(c, a)];
        if edges.iter().any(|e| owners.get(e).copied().unwrap_or(0) >= 2) {
            continue;
        }
        for e in edges {
            *owners.entry(e).or_insert(0) += 1;
        }
        triangles.push(candidate.triangle);
    }

    debug!(
        "triangulate_surface: {} points, {} candidates ({} unique), {} triangles in {:?}",
        points.len(),
        generated,
        ordered.len(),
        triangles.len(),
        start.elapsed()
    );
    Topology::from_triangles(points.len(), triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::RadialOcclusion;

    fn fibonacci_sphere(n: usize) -> Vec<DVec3> {
        let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
        (0..n)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
                let r = (1.0 - z * z).sqrt();
                let phi = golden * i as f64;
                DVec3::new(r * phi.cos(), r * phi.sin(), z)
            })
            .collect()
    }

    fn unit_occlusion() -> RadialOcclusion<impl Fn(DVec3) -> f64 + Sync> {
        RadialOcclusion {
            center: DVec3::ZERO,
            ratio: 0.85,
            ideal_radius: |_: DVec3| 1.0,
        }
    }

    #[test]
    fn test_sphere_triangulation_invariants() {
        let points = fibonacci_sphere(120);
        let topo = triangulate_surface(&points, DVec3::ZERO, &unit_occlusion(), &TopologyConfig::default()).unwrap();

        assert!(!topo.triangles().is_empty());
        topo.validate().unwrap();
        for i in 0..topo.edges().len() {
            assert!(topo.edge_triangles(i).len() <= 2);
        }
    }

    #[test]
    fn test_triangles_face_outward() {
        let points = fibonacci_sphere(80);
        let topo = triangulate_surface(&points, DVec3::ZERO, &unit_occlusion(), &TopologyConfig::default()).unwrap();

        for &[a, b, c] in topo.triangles() {
            let (pa, pb, pc) = (points[a], points[b], points[c]);
            let normal = (pb - pa).cross(pc - pa);
            let centroid = (pa + pb + pc) / 3.0;
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn test_occluded_candidates_dropped() {
        let points = fibonacci_sphere(60);
        let everything_hidden = |_: DVec3| true;
        let topo =
            triangulate_surface(&points, DVec3::ZERO, &everything_hidden, &TopologyConfig::default()).unwrap();
        assert!(topo.triangles().is_empty());
        assert!(topo.edges().is_empty());
    }

    #[test]
    fn test_invariant_holds_for_random_clouds() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..4 {
            let mut rng = StdRng::seed_from_u64(seed);
            let points: Vec<DVec3> = (0..90)
                .map(|_| {
                    let d = DVec3::new(
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                    );
                    d.normalize_or(DVec3::X) * rng.random_range(0.9..1.1)
                })
                .collect();
            let config = TopologyConfig {
                surface_neighbors: 10,
                ..Default::default()
            };
            let topo = triangulate_surface(&points, DVec3::ZERO, &unit_occlusion(), &config).unwrap();
            topo.validate().unwrap();
        }
    }
}
