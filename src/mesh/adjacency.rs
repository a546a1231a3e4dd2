//! Edge/face/vertex adjacency for indexed polygon meshes.

use std::collections::BTreeMap;

use crate::error::{MeshError, Result};

/// A face adjacent to another face across a shared edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// Index of the adjacent face.
    pub face: usize,
    /// The shared edge, directed as the *owning* face traverses it.
    pub edge: (usize, usize),
}

/// An edge shared by exactly two faces.
///
/// With consistent winding, `left` traverses the edge `a → b` and `right`
/// traverses it `b → a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteriorEdge {
    pub a: usize,
    pub b: usize,
    pub left: usize,
    pub right: usize,
}

/// Adjacency information for a mesh.
///
/// Edges are keyed by their sorted vertex pair so iteration order is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    /// Sorted edge `(v0, v1)` with `v0 < v1` mapped to `(face, forward)`
    /// entries; `forward` is `true` when the face walks `v0 → v1`.
    edge_to_faces: BTreeMap<(usize, usize), Vec<(usize, bool)>>,
    face_neighbors: Vec<Vec<Neighbor>>,
    vertex_to_faces: Vec<Vec<usize>>,
}

impl MeshAdjacency {
    /// Builds adjacency from face vertex lists.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::InvalidMesh` if an edge is shared by more than two
    /// faces, or if two faces traverse a shared edge in the same direction
    /// (inconsistent winding).
    pub fn build(faces: &[Vec<usize>], vertex_count: usize) -> Result<Self> {
        let mut edge_to_faces: BTreeMap<(usize, usize), Vec<(usize, bool)>> = BTreeMap::new();
        let mut vertex_to_faces = vec![Vec::new(); vertex_count];

        for (face_idx, face) in faces.iter().enumerate() {
            for &v in face {
                vertex_to_faces[v].push(face_idx);
            }
            for (a, b) in cyclic_edges(face) {
                let (key, forward) = normalize_edge(a, b);
                edge_to_faces.entry(key).or_default().push((face_idx, forward));
            }
        }

        let mut face_neighbors = vec![Vec::new(); faces.len()];
        for (&(v0, v1), users) in &edge_to_faces {
            match users.as_slice() {
                [_] => {}
                [(f, f_fwd), (g, g_fwd)] => {
                    if f_fwd == g_fwd {
                        return Err(MeshError::InvalidMesh(format!(
                            "faces {f} and {g} have inconsistent winding across edge ({v0}, {v1})"
                        ))
                        .into());
                    }
                    let directed = |fwd: bool| if fwd { (v0, v1) } else { (v1, v0) };
                    face_neighbors[*f].push(Neighbor {
                        face: *g,
                        edge: directed(*f_fwd),
                    });
                    face_neighbors[*g].push(Neighbor {
                        face: *f,
                        edge: directed(*g_fwd),
                    });
                }
                _ => {
                    return Err(MeshError::InvalidMesh(format!(
                        "edge ({v0}, {v1}) is shared by {} faces",
                        users.len()
                    ))
                    .into());
                }
            }
        }

        // Neighbours in the order the owning face walks its edges.
        for (face_idx, neighbors) in face_neighbors.iter_mut().enumerate() {
            let face = &faces[face_idx];
            neighbors.sort_by_key(|n| {
                face.iter()
                    .position(|&v| v == n.edge.0)
                    .unwrap_or(usize::MAX)
            });
        }

        Ok(Self {
            edge_to_faces,
            face_neighbors,
            vertex_to_faces,
        })
    }

    /// Faces adjacent to an edge (in either direction).
    #[must_use]
    pub fn faces_of_edge(&self, a: usize, b: usize) -> Vec<usize> {
        let (key, _) = normalize_edge(a, b);
        self.edge_to_faces
            .get(&key)
            .map(|users| users.iter().map(|&(f, _)| f).collect())
            .unwrap_or_default()
    }

    /// Faces sharing an edge with `face`, in the face's edge order.
    #[must_use]
    pub fn neighbors(&self, face: usize) -> &[Neighbor] {
        self.face_neighbors.get(face).map_or(&[], Vec::as_slice)
    }

    /// Faces using vertex `v`.
    #[must_use]
    pub fn faces_of_vertex(&self, v: usize) -> &[usize] {
        self.vertex_to_faces.get(v).map_or(&[], Vec::as_slice)
    }

    /// Boundary edges (exactly one adjacent face), directed as the owning
    /// face traverses them.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edge_to_faces
            .iter()
            .filter_map(|(&(v0, v1), users)| match users.as_slice() {
                [(_, true)] => Some((v0, v1)),
                [(_, false)] => Some((v1, v0)),
                _ => None,
            })
    }

    /// Count the number of boundary edges.
    #[must_use]
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_to_faces
            .values()
            .filter(|users| users.len() == 1)
            .count()
    }

    /// Edges shared by two faces.
    pub fn interior_edges(&self) -> impl Iterator<Item = InteriorEdge> + '_ {
        self.edge_to_faces
            .iter()
            .filter_map(|(&(v0, v1), users)| match users.as_slice() {
                [(f, true), (g, false)] | [(g, false), (f, true)] => Some(InteriorEdge {
                    a: v0,
                    b: v1,
                    left: *f,
                    right: *g,
                }),
                _ => None,
            })
    }

    /// Returns `true` if the mesh has no boundary edges.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.edge_to_faces.values().all(|users| users.len() == 2)
    }

    /// Get the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_to_faces.len()
    }
}

/// Iterates the closed edge cycle of a face: `(v0, v1), (v1, v2), ..., (vn, v0)`.
pub fn cyclic_edges(face: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let n = face.len();
    (0..n).map(move |i| (face[i], face[(i + 1) % n]))
}

/// Normalize edge direction so v0 < v1; also reports whether the input was
/// already in that order.
#[inline]
fn normalize_edge(v0: usize, v1: usize) -> ((usize, usize), bool) {
    if v0 < v1 {
        ((v0, v1), true)
    } else {
        ((v1, v0), false)
    }
}
