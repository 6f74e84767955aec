//! Internal skeleton graph and skin-to-bone links.
//!
//! Both passes scale their cutoffs by the mean nearest-neighbor distance of
//! the packed point set, so the same factors work at any packing density.
//! Vertex numbering follows the packed layout: surface points occupy
//! `[0, S)` and internal points `[S, S + I)`.

use std::collections::BTreeSet;

use glam::DVec3;
use morpho_config::TopologyConfig;
use tracing::debug;

use crate::error::MeshError;
use crate::spatial::PointOctree;
use crate::topology::Topology;

/// Mean distance from each point to its nearest neighbor (0 for < 2 points).
pub fn mean_nearest_neighbor_distance(points: &[DVec3]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let octree = PointOctree::from_points(points);
    let total: f64 = points
        .iter()
        .enumerate()
        .filter_map(|(i, &p)| octree.k_nearest(p, 1, Some(i)).first().map(|&(_, d)| d))
        .sum();
    total / points.len() as f64
}

/// Distance-bounded k-NN graph among `internal` points (local indices).
pub fn build_skeleton(internal: &[DVec3], neighbor_scale: f64, config: &TopologyConfig) -> Vec<[usize; 2]> {
    let cutoff = config.skeleton_distance_factor * neighbor_scale;
    let octree = PointOctree::from_points(internal);

    let mut edges = BTreeSet::new();
    for (i, &p) in internal.iter().enumerate() {
        for (j, dist) in octree.k_nearest(p, config.skeleton_neighbors, Some(i)) {
            if dist <= cutoff {
                edges.insert(if i < j { [i, j] } else { [j, i] });
            }
        }
    }
    edges.into_iter().collect()
}

/// Every surface–internal pair within the link cutoff, in global indices.
pub fn build_links(
    surface: &[DVec3],
    internal: &[DVec3],
    neighbor_scale: f64,
    config: &TopologyConfig,
) -> Vec<[usize; 2]> {
    let cutoff = config.link_distance_factor * neighbor_scale;
    let offset = surface.len();
    let octree = PointOctree::from_points(internal);

    let mut links = Vec::new();
    for (s, &p) in surface.iter().enumerate() {
        for j in octree.query_sphere(p, cutoff) {
            links.push([s, offset + j]);
        }
    }
    links
}

/// Skeleton and link edge counts for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeStats {
    pub skeleton_edges: usize,
    pub links: usize,
    pub neighbor_scale: f64,
}

/// Combine a surface topology over `[0, S)` with the skeleton and links.
pub fn assemble_volume(
    surface_topology: &Topology,
    surface: &[DVec3],
    internal: &[DVec3],
    config: &TopologyConfig,
) -> Result<(Topology, VolumeStats), MeshError> {
    let mut all = Vec::with_capacity(surface.len() + internal.len());
    all.extend_from_slice(surface);
    all.extend_from_slice(internal);
    let neighbor_scale = mean_nearest_neighbor_distance(&all);

    let offset = surface.len();
    let mut extra: Vec<[usize; 2]> = build_skeleton(internal, neighbor_scale, config)
        .into_iter()
        .map(|[a, b]| [a + offset, b + offset])
        .collect();
    let skeleton_edges = extra.len();
    let links = build_links(surface, internal, neighbor_scale, config);
    let link_count = links.len();
    extra.extend(links);

    let topology = surface_topology.with_edges(all.len(), &extra)?;
    debug!(
        "assemble_volume: {} skeleton edges, {} links, scale {:.4}",
        skeleton_edges, link_count, neighbor_scale
    );
    Ok((
        topology,
        VolumeStats {
            skeleton_edges,
            links: link_count,
            neighbor_scale,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn lattice(n: usize, step: f64) -> Vec<DVec3> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push(DVec3::new(x as f64, y as f64, z as f64) * step);
                }
            }
        }
        points
    }

    #[test]
    fn test_mean_nearest_neighbor_distance() {
        assert_eq!(mean_nearest_neighbor_distance(&[DVec3::ZERO]), 0.0);
        assert_abs_diff_eq!(mean_nearest_neighbor_distance(&lattice(3, 0.5)), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_skeleton_respects_cutoff() {
        let points = lattice(3, 1.0);
        let config = TopologyConfig {
            skeleton_neighbors: 26,
            skeleton_distance_factor: 1.0,
            ..Default::default()
        };
        let edges = build_skeleton(&points, 1.0, &config);
        // Only axis-aligned unit neighbors: 3 directions × 3 × 3 × 2
        assert_eq!(edges.len(), 54);
        for [a, b] in edges {
            assert!(a < b);
            assert_abs_diff_eq!(points[a].distance(points[b]), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_links_cross_partition() {
        let surface = vec![DVec3::new(0.0, 0.0, 1.0), DVec3::new(5.0, 0.0, 0.0)];
        let internal = vec![DVec3::ZERO, DVec3::new(0.0, 0.0, 0.5)];
        let config = TopologyConfig {
            link_distance_factor: 1.0,
            ..Default::default()
        };
        let links = build_links(&surface, &internal, 1.0, &config);
        assert_eq!(links, vec![[0, 2], [0, 3]]);
    }

    #[test]
    fn test_assemble_volume_offsets_indices() {
        let surface = vec![
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        ];
        let internal = vec![DVec3::splat(0.2), DVec3::splat(0.3)];
        let surface_topology = Topology::from_triangles(3, vec![[0, 1, 2]]).unwrap();
        let config = TopologyConfig::default();

        let (topology, stats) = assemble_volume(&surface_topology, &surface, &internal, &config).unwrap();
        assert_eq!(topology.vertex_count(), 5);
        assert_eq!(stats.skeleton_edges, 1);
        assert!(topology.edge_index(3, 4).is_some());
        assert_eq!(topology.triangles().len(), 1);
        topology.validate().unwrap();
    }
}
