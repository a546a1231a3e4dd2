//! Indexed polygon mesh used as the input of every unfolding operation.
//!
//! Vertices and faces live in flat arrays; faces refer to vertices by index
//! and the adjacency index refers to faces by index, so traversal never
//! needs shared ownership.

mod adjacency;

pub use adjacency::{cyclic_edges, InteriorEdge, MeshAdjacency, Neighbor};

use std::collections::VecDeque;

use crate::error::{MeshError, Result};
use crate::math::{Point3, Vector3, TOLERANCE};

/// A planar (or near-planar) polygonal face.
#[derive(Debug, Clone)]
pub struct Face {
    vertices: Vec<usize>,
    normal: Vector3,
    area: f64,
}

impl Face {
    /// Vertex indices in winding order (counter-clockwise seen from outside).
    #[must_use]
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    /// Unit normal (Newell's method).
    #[must_use]
    pub fn normal(&self) -> Vector3 {
        self.normal
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Number of corners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Position of vertex `v` within this face.
    #[must_use]
    pub fn corner_of(&self, v: usize) -> Option<usize> {
        self.vertices.iter().position(|&w| w == v)
    }

    /// Fan triangulation from the first corner, as corner indices.
    pub fn fan(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (1..self.vertices.len() - 1).map(|i| [0, i, i + 1])
    }
}

/// A manifold polygon mesh with consistent winding.
///
/// Constructed once and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Point3>,
    faces: Vec<Face>,
    adjacency: MeshAdjacency,
}

impl Mesh {
    /// Builds and validates a mesh.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::InvalidMesh` if the mesh is empty, a vertex has a
    /// NaN or infinite coordinate, a face has fewer
    /// than three corners, repeats a vertex, references a missing vertex or
    /// has (near-)zero area, a vertex is not used by any face, an edge is
    /// shared by more than two faces, or adjacent faces disagree on winding.
    pub fn new(vertices: Vec<Point3>, faces: Vec<Vec<usize>>) -> Result<Self> {
        if vertices.is_empty() || faces.is_empty() {
            return Err(MeshError::InvalidMesh("mesh has no vertices or faces".into()).into());
        }
        if let Some(v) = vertices.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(MeshError::InvalidMesh(format!(
                "vertex {v} has a non-finite coordinate"
            ))
            .into());
        }

        let mut used = vec![false; vertices.len()];
        let mut built = Vec::with_capacity(faces.len());
        for (idx, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::InvalidMesh(format!(
                    "face {idx} has {} vertices, at least 3 are required",
                    face.len()
                ))
                .into());
            }
            for (i, &v) in face.iter().enumerate() {
                if v >= vertices.len() {
                    return Err(MeshError::InvalidMesh(format!(
                        "face {idx} references vertex {v}, mesh has {}",
                        vertices.len()
                    ))
                    .into());
                }
                if face[i + 1..].contains(&v) {
                    return Err(MeshError::InvalidMesh(format!(
                        "face {idx} repeats vertex {v}"
                    ))
                    .into());
                }
                used[v] = true;
            }

            let newell = newell_normal(&vertices, face);
            let area = newell.norm() * 0.5;
            if area <= TOLERANCE {
                return Err(
                    MeshError::InvalidMesh(format!("face {idx} is degenerate (zero area)")).into(),
                );
            }
            built.push(Face {
                vertices: face.clone(),
                normal: newell / (2.0 * area),
                area,
            });
        }

        if let Some(v) = used.iter().position(|u| !u) {
            return Err(MeshError::InvalidMesh(format!("vertex {v} is not used by any face")).into());
        }

        let adjacency = MeshAdjacency::build(&faces, vertices.len())?;

        Ok(Self {
            vertices,
            faces: built,
            adjacency,
        })
    }

    /// Builds a mesh from flat coordinate and face arrays, as delivered by
    /// the CAD extraction layer.
    ///
    /// # Errors
    ///
    /// See [`Mesh::new`].
    pub fn from_arrays(vertices: &[[f64; 3]], faces: &[Vec<usize>]) -> Result<Self> {
        let points = vertices
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect();
        Self::new(points, faces.to_vec())
    }

    /// Builds a triangle mesh from flat arrays.
    ///
    /// # Errors
    ///
    /// See [`Mesh::new`].
    pub fn from_triangles(vertices: &[[f64; 3]], triangles: &[[usize; 3]]) -> Result<Self> {
        let faces: Vec<Vec<usize>> = triangles.iter().map(|t| t.to_vec()).collect();
        Self::from_arrays(vertices, &faces)
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    #[must_use]
    pub fn vertex(&self, v: usize) -> Point3 {
        self.vertices[v]
    }

    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[must_use]
    pub fn face(&self, f: usize) -> &Face {
        &self.faces[f]
    }

    #[must_use]
    pub fn face_normal(&self, f: usize) -> Vector3 {
        self.faces[f].normal
    }

    #[must_use]
    pub fn face_area(&self, f: usize) -> f64 {
        self.faces[f].area
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[must_use]
    pub fn adjacency(&self) -> &MeshAdjacency {
        &self.adjacency
    }

    /// Total surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.faces.iter().map(Face::area).sum()
    }

    /// Length of the bounding-box diagonal, used to scale tolerances.
    #[must_use]
    pub fn extent(&self) -> f64 {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for p in &self.vertices[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        (max - min).norm()
    }

    /// Centroid of a face's corners.
    #[must_use]
    pub fn face_centroid(&self, f: usize) -> Point3 {
        let face = &self.faces[f];
        let sum = face
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, &v| acc + self.vertices[v].coords);
        #[allow(clippy::cast_precision_loss)]
        let count = face.len() as f64;
        Point3::from(sum / count)
    }

    /// Dihedral angle between two adjacent faces, in radians.
    ///
    /// A flat pair gives `π`; the value is computed from the face normals.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::InvalidMesh` if the faces do not share an edge.
    pub fn dihedral_angle(&self, f: usize, g: usize) -> Result<f64> {
        if !self.adjacency.neighbors(f).iter().any(|n| n.face == g) {
            return Err(
                MeshError::InvalidMesh(format!("faces {f} and {g} are not adjacent")).into(),
            );
        }
        let cos = self.faces[f]
            .normal
            .dot(&self.faces[g].normal)
            .clamp(-1.0, 1.0);
        Ok(std::f64::consts::PI - cos.acos())
    }

    /// Signed bend across an interior edge: the angle between the two face
    /// normals, positive when the surface folds toward its normals (the
    /// edge is concave seen from the front side).
    #[must_use]
    pub fn bend_angle(&self, edge: &InteriorEdge) -> f64 {
        let n_left = self.faces[edge.left].normal;
        let n_right = self.faces[edge.right].normal;
        let dir = self.vertices[edge.b] - self.vertices[edge.a];
        let len = dir.norm();
        if len < TOLERANCE {
            return 0.0;
        }
        // The left face walks a → b, so `dir` is its counter-clockwise
        // boundary direction along the shared edge.
        let sin = n_right.cross(&n_left).dot(&(dir / len));
        let cos = n_left.dot(&n_right);
        sin.atan2(cos)
    }

    /// Groups faces into edge-connected components.
    ///
    /// Components are ordered by their lowest face index, and faces within a
    /// component are listed in breadth-first order.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut component = vec![usize::MAX; self.faces.len()];
        let mut components = Vec::new();

        for seed in 0..self.faces.len() {
            if component[seed] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = Vec::new();
            let mut queue = VecDeque::from([seed]);
            component[seed] = id;
            while let Some(f) = queue.pop_front() {
                members.push(f);
                for n in self.adjacency.neighbors(f) {
                    if component[n.face] == usize::MAX {
                        component[n.face] = id;
                        queue.push_back(n.face);
                    }
                }
            }
            components.push(members);
        }
        components
    }

    /// Ensures the mesh forms a single edge-connected piece.
    ///
    /// # Errors
    ///
    /// Returns `MeshError::InvalidMesh` if there is more than one component.
    pub fn require_single_component(&self) -> Result<()> {
        let count = self.connected_components().len();
        if count > 1 {
            return Err(MeshError::InvalidMesh(format!(
                "mesh has {count} connected components, a single pattern needs one"
            ))
            .into());
        }
        Ok(())
    }

    /// Builds a new mesh from a subset of faces, re-indexing vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if the subset is empty.
    pub fn submesh(&self, face_ids: &[usize]) -> Result<Self> {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        let mut faces = Vec::with_capacity(face_ids.len());
        for &f in face_ids {
            let mut face = Vec::with_capacity(self.faces[f].len());
            for &v in &self.faces[f].vertices {
                if remap[v] == usize::MAX {
                    remap[v] = vertices.len();
                    vertices.push(self.vertices[v]);
                }
                face.push(remap[v]);
            }
            faces.push(face);
        }
        Self::new(vertices, faces)
    }

    /// Splits the mesh into one mesh per connected component.
    ///
    /// # Errors
    ///
    /// Propagates construction errors of the component meshes.
    pub fn split_components(&self) -> Result<Vec<Self>> {
        self.connected_components()
            .iter()
            .map(|faces| self.submesh(faces))
            .collect()
    }

    /// Returns the same surface with every face's winding reversed, which
    /// flips all normals.
    #[must_use]
    pub fn flipped(&self) -> Self {
        let faces: Vec<Vec<usize>> = self
            .faces
            .iter()
            .map(|f| f.vertices.iter().rev().copied().collect())
            .collect();
        let built = self
            .faces
            .iter()
            .zip(&faces)
            .map(|(f, verts)| Face {
                vertices: verts.clone(),
                normal: -f.normal,
                area: f.area,
            })
            .collect();
        // Reversing every face keeps the winding consistent, so the rebuild
        // cannot fail for a mesh that was valid before.
        let adjacency =
            MeshAdjacency::build(&faces, self.vertices.len()).unwrap_or_else(|_| self.adjacency.clone());
        Self {
            vertices: self.vertices.clone(),
            faces: built,
            adjacency,
        }
    }
}

/// Newell's polygon normal; its length is twice the polygon area.
fn newell_normal(vertices: &[Point3], face: &[usize]) -> Vector3 {
    let mut n = Vector3::zeros();
    for (a, b) in cyclic_edges(face) {
        let p = vertices[a];
        let q = vertices[b];
        n.x += (p.y - q.y) * (p.z + q.z);
        n.y += (p.z - q.z) * (p.x + q.x);
        n.z += (p.x - q.x) * (p.y + q.y);
    }
    n
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// Regular grid of `nx * ny` quads in the XY plane.
    pub(crate) fn grid(nx: usize, ny: usize, dx: f64, dy: f64) -> Mesh {
        let mut vertices = Vec::new();
        for j in 0..=ny {
            for i in 0..=nx {
                #[allow(clippy::cast_precision_loss)]
                vertices.push(Point3::new(i as f64 * dx, j as f64 * dy, 0.0));
            }
        }
        let idx = |i: usize, j: usize| j * (nx + 1) + i;
        let mut faces = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                faces.push(vec![idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        Mesh::new(vertices, faces).unwrap()
    }

    /// Two triangles forming a unit square, bent along the diagonal 0–2 by
    /// `bend` radians (0 = flat).
    pub(crate) fn hinged_square(bend: f64) -> Mesh {
        // Diagonal from (0,0,0) to (1,1,0); vertex 3 rotates about it.
        let axis = Vector3::new(1.0, 1.0, 0.0).normalize();
        let rel = Vector3::new(0.0, 1.0, 0.0);
        let along = axis * rel.dot(&axis);
        let perp_v = rel - along;
        let rotated = along + perp_v * bend.cos() + axis.cross(&perp_v) * bend.sin();
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::from(rotated),
        ];
        Mesh::new(vertices, vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap()
    }

    #[test]
    fn square_quad() {
        let mesh = grid(1, 1, 2.0, 3.0);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 1);
        assert_abs_diff_eq!(mesh.face(0).area(), 6.0);
        assert_abs_diff_eq!(mesh.face(0).normal().z, 1.0);
        assert_eq!(mesh.face(0).fan().collect::<Vec<_>>(), vec![[0, 1, 2], [0, 2, 3]]);
        assert_abs_diff_eq!(mesh.extent(), 13.0_f64.sqrt());
    }

    #[test]
    fn rejects_bad_input() {
        let p = |x: f64, y: f64| Point3::new(x, y, 0.0);
        assert!(Mesh::new(vec![], vec![]).is_err());
        assert!(Mesh::new(vec![p(0.0, 0.0), p(1.0, 0.0)], vec![vec![0, 1]]).is_err());
        assert!(Mesh::new(vec![p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0)], vec![vec![0, 1, 5]]).is_err());
        assert!(Mesh::new(vec![p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0)], vec![vec![0, 1, 1]]).is_err());
        // Collinear triangle.
        assert!(Mesh::new(vec![p(0.0, 0.0), p(1.0, 0.0), p(2.0, 0.0)], vec![vec![0, 1, 2]]).is_err());
        // Unused vertex.
        assert!(Mesh::new(
            vec![p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0), p(5.0, 5.0)],
            vec![vec![0, 1, 2]]
        )
        .is_err());
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = Mesh::from_arrays(
                &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [bad, 1.0, 0.0]],
                &[vec![0, 1, 2]],
            )
            .unwrap_err();
            assert!(matches!(
                err,
                crate::SheetfoldError::Mesh(MeshError::InvalidMesh(_))
            ));
        }
    }

    #[test]
    fn dihedral_of_flat_and_folded_pairs() {
        let flat = hinged_square(0.0);
        assert_abs_diff_eq!(flat.dihedral_angle(0, 1).unwrap(), PI, epsilon = 1e-12);

        let folded = hinged_square(FRAC_PI_2);
        assert_abs_diff_eq!(folded.dihedral_angle(0, 1).unwrap(), FRAC_PI_2, epsilon = 1e-12);

        let single = grid(2, 1, 1.0, 1.0);
        assert!(single.dihedral_angle(0, 0).is_err());
    }

    #[test]
    fn bend_sign_flips_with_orientation() {
        let mesh = hinged_square(0.4);
        let edge = mesh.adjacency().interior_edges().next().unwrap();
        let bend = mesh.bend_angle(&edge);
        assert_abs_diff_eq!(bend.abs(), 0.4, epsilon = 1e-12);

        let flipped = mesh.flipped();
        let edge = flipped.adjacency().interior_edges().next().unwrap();
        assert_abs_diff_eq!(flipped.bend_angle(&edge), -bend, epsilon = 1e-12);
    }

    #[test]
    fn components_and_split() {
        let p = |x: f64, y: f64| Point3::new(x, y, 0.0);
        let mesh = Mesh::new(
            vec![
                p(0.0, 0.0),
                p(1.0, 0.0),
                p(0.0, 1.0),
                p(5.0, 0.0),
                p(6.0, 0.0),
                p(5.0, 1.0),
            ],
            vec![vec![0, 1, 2], vec![3, 4, 5]],
        )
        .unwrap();
        assert_eq!(mesh.connected_components(), vec![vec![0], vec![1]]);
        assert!(mesh.require_single_component().is_err());

        let parts = mesh.split_components().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].vertex_count(), 3);
        assert_abs_diff_eq!(parts[1].vertex(0).x, 5.0);

        assert!(grid(3, 2, 1.0, 1.0).require_single_component().is_ok());
    }
}
