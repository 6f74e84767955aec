//! Octree over point positions for neighborhood queries.
//!
//! Used by the packer (repulsion neighbors within `spacing`), the
//! triangulator (k nearest surface neighbors) and the skeleton/link
//! builders. Query results are sorted so callers stay deterministic no
//! matter how points were distributed over octants.

use glam::DVec3;

/// Configuration for octree construction.
#[derive(Debug, Clone)]
pub struct OctreeConfig {
    /// Maximum depth of the octree.
    pub max_depth: u32,
    /// Maximum items per leaf node before splitting.
    pub max_items_per_leaf: usize,
    /// Minimum node size (prevents infinite subdivision).
    pub min_node_size: f64,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_items_per_leaf: 12,
            min_node_size: 1e-4,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Box of half-extent `half` around `center`.
    pub fn from_center(center: DVec3, half: DVec3) -> Self {
        Self::new(center - half, center + half)
    }

    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(f64::MIN),
        }
    }

    pub fn include_point(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Squared distance from `point` to the box (zero inside).
    pub fn distance_squared(&self, point: DVec3) -> f64 {
        point.clamp(self.min, self.max).distance_squared(point)
    }

    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.distance_squared(center) <= radius * radius
    }

    /// Octant index for a point (0-7).
    fn octant_for_point(&self, point: DVec3) -> usize {
        let center = self.center();
        let mut index = 0;
        if point.x >= center.x {
            index |= 1;
        }
        if point.y >= center.y {
            index |= 2;
        }
        if point.z >= center.z {
            index |= 4;
        }
        index
    }

    fn octant_bounds(&self, octant: usize) -> Aabb {
        let center = self.center();
        let min = DVec3::new(
            if octant & 1 != 0 { center.x } else { self.min.x },
            if octant & 2 != 0 { center.y } else { self.min.y },
            if octant & 4 != 0 { center.z } else { self.min.z },
        );
        let max = DVec3::new(
            if octant & 1 != 0 { self.max.x } else { center.x },
            if octant & 2 != 0 { self.max.y } else { center.y },
            if octant & 4 != 0 { self.max.z } else { center.z },
        );
        Aabb::new(min, max)
    }
}

#[derive(Debug, Clone, Copy)]
struct OctreeItem {
    id: usize,
    position: DVec3,
}

#[derive(Debug)]
enum OctreeNode {
    Leaf {
        bounds: Aabb,
        items: Vec<OctreeItem>,
    },
    Internal {
        bounds: Aabb,
        children: Box<[Option<OctreeNode>; 8]>,
    },
}

impl OctreeNode {
    fn bounds(&self) -> &Aabb {
        match self {
            OctreeNode::Leaf { bounds, .. } | OctreeNode::Internal { bounds, .. } => bounds,
        }
    }
}

/// A spatial octree over indexed points.
#[derive(Debug)]
pub struct PointOctree {
    root: OctreeNode,
    config: OctreeConfig,
    len: usize,
}

impl PointOctree {
    pub fn new(bounds: Aabb) -> Self {
        Self::with_config(bounds, OctreeConfig::default())
    }

    pub fn with_config(bounds: Aabb, config: OctreeConfig) -> Self {
        Self {
            root: OctreeNode::Leaf {
                bounds,
                items: Vec::new(),
            },
            config,
            len: 0,
        }
    }

    /// Build an octree over `points`, using slice indices as ids.
    pub fn from_points(points: &[DVec3]) -> Self {
        let mut bounds = Aabb::empty();
        for &p in points {
            bounds.include_point(p);
        }
        if points.is_empty() {
            bounds = Aabb::new(DVec3::ZERO, DVec3::ZERO);
        }

        // Expand bounds slightly to handle edge cases
        let padding = bounds.size() * 0.01 + DVec3::splat(0.001);
        bounds.min -= padding;
        bounds.max += padding;

        let mut octree = Self::new(bounds);
        for (id, &position) in points.iter().enumerate() {
            octree.insert(id, position);
        }
        octree
    }

    pub fn insert(&mut self, id: usize, position: DVec3) {
        let config = self.config.clone();
        Self::insert_into_node(&mut self.root, OctreeItem { id, position }, 0, &config);
        self.len += 1;
    }

    fn insert_into_node(node: &mut OctreeNode, item: OctreeItem, depth: u32, config: &OctreeConfig) {
        match node {
            OctreeNode::Leaf { bounds, items } => {
                items.push(item);

                if items.len() > config.max_items_per_leaf
                    && depth < config.max_depth
                    && bounds.size().max_element() > config.min_node_size * 2.0
                {
                    let old_items = std::mem::take(items);
                    let old_bounds = *bounds;

                    *node = OctreeNode::Internal {
                        bounds: old_bounds,
                        children: Box::new([None, None, None, None, None, None, None, None]),
                    };

                    for item in old_items {
                        Self::insert_into_node(node, item, depth, config);
                    }
                }
            }
            OctreeNode::Internal { bounds, children } => {
                let octant = bounds.octant_for_point(item.position);
                let child = children[octant].get_or_insert_with(|| OctreeNode::Leaf {
                    bounds: bounds.octant_bounds(octant),
                    items: Vec::new(),
                });
                Self::insert_into_node(child, item, depth + 1, config);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ids of all points within `radius` of `center`, ascending.
    pub fn query_sphere(&self, center: DVec3, radius: f64) -> Vec<usize> {
        let mut results = Vec::new();
        Self::query_sphere_node(&self.root, center, radius, &mut results);
        results.sort_unstable();
        results
    }

    fn query_sphere_node(node: &OctreeNode, center: DVec3, radius: f64, results: &mut Vec<usize>) {
        if !node.bounds().intersects_sphere(center, radius) {
            return;
        }
        match node {
            OctreeNode::Leaf { items, .. } => {
                let radius_sq = radius * radius;
                results.extend(
                    items
                        .iter()
                        .filter(|item| item.position.distance_squared(center) <= radius_sq)
                        .map(|item| item.id),
                );
            }
            OctreeNode::Internal { children, .. } => {
                for child in children.iter().flatten() {
                    Self::query_sphere_node(child, center, radius, results);
                }
            }
        }
    }

    /// The `k` nearest points to `center` as `(id, distance)`, nearest first.
    ///
    /// Ties are broken by id. `exclude` skips one id, typically the query
    /// point itself.
    pub fn k_nearest(&self, center: DVec3, k: usize, exclude: Option<usize>) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
        Self::k_nearest_node(&self.root, center, k, exclude, &mut best);
        best.into_iter().map(|(d2, id)| (id, d2.sqrt())).collect()
    }

    fn k_nearest_node(
        node: &OctreeNode,
        center: DVec3,
        k: usize,
        exclude: Option<usize>,
        best: &mut Vec<(f64, usize)>,
    ) {
        if best.len() == k {
            if let Some(&(worst, _)) = best.last() {
                if node.bounds().distance_squared(center) > worst {
                    return;
                }
            }
        }
        match node {
            OctreeNode::Leaf { items, .. } => {
                for item in items {
                    if Some(item.id) == exclude {
                        continue;
                    }
                    let candidate = (item.position.distance_squared(center), item.id);
                    let at = best.partition_point(|entry| {
                        entry.0 < candidate.0 || (entry.0 == candidate.0 && entry.1 < candidate.1)
                    });
                    if at < k {
                        best.insert(at, candidate);
                        best.truncate(k);
                    }
                }
            }
            OctreeNode::Internal { children, .. } => {
                let mut order: Vec<(f64, &OctreeNode)> = children
                    .iter()
                    .flatten()
                    .map(|child| (child.bounds().distance_squared(center), child))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (_, child) in order {
                    Self::k_nearest_node(child, center, k, exclude, best);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<DVec3> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                DVec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_octree_insert_and_query() {
        let bounds = Aabb::new(DVec3::ZERO, DVec3::splat(10.0));
        let mut octree = PointOctree::new(bounds);

        octree.insert(0, DVec3::new(1.0, 1.0, 1.0));
        octree.insert(1, DVec3::new(2.0, 2.0, 2.0));
        octree.insert(2, DVec3::new(8.0, 8.0, 8.0));
        assert_eq!(octree.len(), 3);

        let results = octree.query_sphere(DVec3::splat(1.5), 1.5);
        assert_eq!(results, vec![0, 1]);
    }

    #[test]
    fn test_query_sphere_matches_brute_force() {
        let points = random_points(500, 1);
        let octree = PointOctree::from_points(&points);
        let center = DVec3::new(0.1, -0.2, 0.3);

        let expected: Vec<usize> = (0..points.len())
            .filter(|&i| points[i].distance(center) <= 0.4)
            .collect();
        assert_eq!(octree.query_sphere(center, 0.4), expected);
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        let points = random_points(400, 2);
        let octree = PointOctree::from_points(&points);

        for query in [0, 17, 250] {
            let mut brute: Vec<(f64, usize)> = (0..points.len())
                .filter(|&i| i != query)
                .map(|i| (points[i].distance_squared(points[query]), i))
                .collect();
            brute.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let expected: Vec<usize> = brute.iter().take(8).map(|&(_, i)| i).collect();

            let found: Vec<usize> = octree
                .k_nearest(points[query], 8, Some(query))
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_k_nearest_with_fewer_points() {
        let points = [DVec3::ZERO, DVec3::X];
        let octree = PointOctree::from_points(&points);
        let found = octree.k_nearest(DVec3::ZERO, 5, Some(0));
        assert_eq!(found, vec![(1, 1.0)]);
    }

    #[test]
    fn test_flat_point_set_splits() {
        let points: Vec<DVec3> = (0..200)
            .map(|i| DVec3::new((i % 20) as f64 * 0.1, (i / 20) as f64 * 0.1, 0.0))
            .collect();
        let octree = PointOctree::from_points(&points);
        assert_eq!(octree.len(), 200);
        assert_eq!(octree.query_sphere(DVec3::ZERO, 0.15).len(), 4);
    }
}
