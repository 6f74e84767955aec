//! Mesh connectivity shared by the surface, skeleton and link passes.
//!
//! A [`Topology`] holds:
//! - triangles, wound outward
//! - a deduplicated, sorted edge set (`a < b` per edge)
//! - edge → triangle ownership, at most two triangles per edge
//! - per-vertex sorted neighbor lists
//!
//! Edges without triangles are allowed: skeleton edges and skin-to-bone
//! links live in the same edge set as the surface edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// An edge shared by two triangles, with the vertex opposite it in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteriorEdge {
    pub edge: [usize; 2],
    /// Vertex of each owning triangle that is not on the edge
    pub wings: [usize; 2],
    pub triangles: [usize; 2],
}

/// Connectivity for a set of `vertex_count` vertices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    vertex_count: usize,
    triangles: Vec<[usize; 3]>,
    edges: Vec<[usize; 2]>,
    edge_triangles: Vec<Vec<usize>>,
    adjacency: Vec<Vec<usize>>,
}

fn edge_key(a: usize, b: usize) -> [usize; 2] {
    if a < b { [a, b] } else { [b, a] }
}

impl Topology {
    /// Vertices with no connectivity.
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            adjacency: vec![Vec::new(); vertex_count],
            ..Default::default()
        }
    }

    /// Build from triangles plus extra (triangle-free) edges.
    pub fn build(
        vertex_count: usize,
        triangles: Vec<[usize; 3]>,
        extra_edges: &[[usize; 2]],
    ) -> Result<Self, MeshError> {
        let mut owners: BTreeMap<[usize; 2], Vec<usize>> = BTreeMap::new();

        for (t, tri) in triangles.iter().enumerate() {
            for &v in tri {
                check_vertex(v, vertex_count)?;
            }
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                if a == b {
                    return Err(MeshError::DegenerateElement { vertex: a });
                }
                owners.entry(edge_key(a, b)).or_default().push(t);
            }
        }
        for &[a, b] in extra_edges {
            check_vertex(a, vertex_count)?;
            check_vertex(b, vertex_count)?;
            if a == b {
                return Err(MeshError::DegenerateElement { vertex: a });
            }
            owners.entry(edge_key(a, b)).or_default();
        }

        let mut adjacency = vec![Vec::new(); vertex_count];
        let mut edges = Vec::with_capacity(owners.len());
        let mut edge_triangles = Vec::with_capacity(owners.len());
        for (edge, tris) in owners {
            if tris.len() > 2 {
                return Err(MeshError::EdgeOverflow {
                    a: edge[0],
                    b: edge[1],
                    owners: tris.len(),
                });
            }
            adjacency[edge[0]].push(edge[1]);
            adjacency[edge[1]].push(edge[0]);
            edges.push(edge);
            edge_triangles.push(tris);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        Ok(Self {
            vertex_count,
            triangles,
            edges,
            edge_triangles,
            adjacency,
        })
    }

    /// Build from triangles only.
    pub fn from_triangles(vertex_count: usize, triangles: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        Self::build(vertex_count, triangles, &[])
    }

    /// Build from edges only.
    pub fn from_edges(vertex_count: usize, edges: &[[usize; 2]]) -> Result<Self, MeshError> {
        Self::build(vertex_count, Vec::new(), edges)
    }

    /// Copy of this topology with more edges and a larger vertex range.
    pub fn with_edges(&self, vertex_count: usize, extra_edges: &[[usize; 2]]) -> Result<Self, MeshError> {
        let mut edges: Vec<[usize; 2]> = self.edges.clone();
        edges.extend_from_slice(extra_edges);
        Self::build(vertex_count.max(self.vertex_count), self.triangles.clone(), &edges)
    }

    /// Open polyline `0 - 1 - ... - (n-1)`.
    pub fn polyline(vertex_count: usize) -> Self {
        let edges: Vec<[usize; 2]> = (1..vertex_count).map(|i| [i - 1, i]).collect();
        Self::from_sorted_chain(vertex_count, edges)
    }

    /// Closed ring `0 - 1 - ... - (n-1) - 0`.
    pub fn ring(vertex_count: usize) -> Self {
        let mut edges: Vec<[usize; 2]> = (1..vertex_count).map(|i| [i - 1, i]).collect();
        if vertex_count > 2 {
            edges.push([0, vertex_count - 1]);
        }
        Self::from_sorted_chain(vertex_count, edges)
    }

    fn from_sorted_chain(vertex_count: usize, mut edges: Vec<[usize; 2]>) -> Self {
        edges.sort_unstable();
        let mut adjacency = vec![Vec::new(); vertex_count];
        for &[a, b] in &edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }
        Self {
            vertex_count,
            triangles: Vec::new(),
            edge_triangles: vec![Vec::new(); edges.len()],
            edges,
            adjacency,
        }
    }

    /// Regular grid of `columns × rows` vertices, row-major, each quad split
    /// along its `(i, j) - (i + 1, j + 1)` diagonal.
    pub fn grid(columns: usize, rows: usize) -> Result<Self, MeshError> {
        let index = |c: usize, r: usize| r * columns + c;
        let mut triangles = Vec::new();
        for r in 0..rows.saturating_sub(1) {
            for c in 0..columns.saturating_sub(1) {
                let (a, b) = (index(c, r), index(c + 1, r));
                let (d, e) = (index(c, r + 1), index(c + 1, r + 1));
                triangles.push([a, b, e]);
                triangles.push([a, e, d]);
            }
        }
        // Single rows or columns still get their chain edges
        let mut extra = Vec::new();
        if rows == 1 || columns == 1 {
            for i in 1..columns * rows {
                extra.push([i - 1, i]);
            }
        }
        Self::build(columns * rows, triangles, &extra)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Owning triangles of edge `index`.
    pub fn edge_triangles(&self, index: usize) -> &[usize] {
        &self.edge_triangles[index]
    }

    /// Sorted neighbors of `vertex`.
    pub fn neighbors(&self, vertex: usize) -> &[usize] {
        self.adjacency.get(vertex).map_or(&[], Vec::as_slice)
    }

    /// Index of edge `(a, b)` in [`edges`](Self::edges).
    pub fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        self.edges.binary_search(&edge_key(a, b)).ok()
    }

    /// Edges owned by exactly two triangles, with their wing vertices.
    pub fn interior_edges(&self) -> Vec<InteriorEdge> {
        self.edges
            .iter()
            .zip(&self.edge_triangles)
            .filter_map(|(&edge, tris)| {
                let &[t0, t1] = tris.as_slice() else {
                    return None;
                };
                Some(InteriorEdge {
                    edge,
                    wings: [
                        opposite(self.triangles[t0], edge)?,
                        opposite(self.triangles[t1], edge)?,
                    ],
                    triangles: [t0, t1],
                })
            })
            .collect()
    }

    /// Check the ownership and edge-set invariants.
    pub fn validate(&self) -> Result<(), MeshError> {
        for (i, tris) in self.edge_triangles.iter().enumerate() {
            if tris.len() > 2 {
                let [a, b] = self.edges[i];
                return Err(MeshError::EdgeOverflow { a, b, owners: tris.len() });
            }
        }
        for (t, tri) in self.triangles.iter().enumerate() {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                if self.edge_index(a, b).is_none() {
                    return Err(MeshError::MissingEdge { triangle: t, a, b });
                }
            }
        }
        Ok(())
    }
}

fn check_vertex(index: usize, count: usize) -> Result<(), MeshError> {
    if index >= count {
        Err(MeshError::VertexOutOfRange { index, count })
    } else {
        Ok(())
    }
}

fn opposite(triangle: [usize; 3], edge: [usize; 2]) -> Option<usize> {
    triangle.into_iter().find(|v| !edge.contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_triangles_share_one_edge() {
        let topo = Topology::from_triangles(4, vec![[0, 1, 2], [0, 2, 3]]).unwrap();
        assert_eq!(topo.edges().len(), 5);
        assert_eq!(topo.neighbors(0), &[1, 2, 3]);

        let interior = topo.interior_edges();
        assert_eq!(interior.len(), 1);
        assert_eq!(interior[0].edge, [0, 2]);
        assert_eq!(interior[0].wings, [1, 3]);
        topo.validate().unwrap();
    }

    #[test]
    fn test_third_owner_rejected() {
        let err = Topology::from_triangles(5, vec![[0, 1, 2], [0, 1, 3], [1, 0, 4]]).unwrap_err();
        assert_eq!(err, MeshError::EdgeOverflow { a: 0, b: 1, owners: 3 });
    }

    #[test]
    fn test_out_of_range_and_degenerate() {
        assert_eq!(
            Topology::from_triangles(3, vec![[0, 1, 3]]).unwrap_err(),
            MeshError::VertexOutOfRange { index: 3, count: 3 }
        );
        assert_eq!(
            Topology::from_edges(3, &[[1, 1]]).unwrap_err(),
            MeshError::DegenerateElement { vertex: 1 }
        );
    }

    #[test]
    fn test_grid_four_by_four() {
        let topo = Topology::grid(4, 4).unwrap();
        assert_eq!(topo.vertex_count(), 16);
        assert_eq!(topo.triangles().len(), 18);
        // 12 horizontal + 12 vertical + 9 diagonal
        assert_eq!(topo.edges().len(), 33);
        assert_eq!(topo.interior_edges().len(), 9 + 6 + 6);
        topo.validate().unwrap();
    }

    #[test]
    fn test_ring_and_polyline() {
        let ring = Topology::ring(5);
        assert_eq!(ring.edges().len(), 5);
        assert_eq!(ring.neighbors(0), &[1, 4]);

        let line = Topology::polyline(5);
        assert_eq!(line.edges().len(), 4);
        assert_eq!(line.neighbors(4), &[3]);
        assert!(line.edge_index(4, 3).is_some());
    }

    #[test]
    fn test_with_edges_extends_vertex_range() {
        let surface = Topology::from_triangles(3, vec![[0, 1, 2]]).unwrap();
        let combined = surface.with_edges(5, &[[3, 4], [0, 3], [1, 0]]).unwrap();
        assert_eq!(combined.vertex_count(), 5);
        assert_eq!(combined.edges().len(), 5);
        assert_eq!(combined.triangles().len(), 1);
        let i = combined.edge_index(0, 1).unwrap();
        assert_eq!(combined.edge_triangles(i), &[0]);
    }
}
