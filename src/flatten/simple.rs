//! Rigid edge-by-edge unfolding.
//!
//! Faces are laid out breadth-first over the face adjacency graph. Each
//! face is placed in its own plane against an edge that is already in
//! the layout, so developable meshes unfold without any stretch.
//!
//! Every mesh vertex keeps the position of its first placement. A face that
//! reaches an already placed vertex is drawn against that position, and the
//! edge-length mismatch shows up in the distortion report. With
//! `split_seams` set, a vertex reached again at a different place gets a
//! second flat copy instead, which cuts the surface open along that edge.
//! Overlaps between faces are not checked here.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::{FlattenParams, Layout};
use crate::budget::BudgetClock;
use crate::math::{perp, Point2};
use crate::mesh::Mesh;

/// Flattens `mesh` by rigid unfolding.
///
/// # Errors
///
/// Returns `SolverError::Timeout` if the face budget is exhausted.
pub(super) fn unfold_rigid(
    mesh: &Mesh,
    params: &FlattenParams,
    clock: &BudgetClock,
) -> crate::Result<Layout> {
    let face_count = mesh.face_count();
    let weld = params.weld_tolerance * mesh.extent().max(1.0);
    let split = params.split_seams;

    let mut layout = Layout::default();
    let mut copies: Vec<Vec<usize>> = vec![Vec::new(); mesh.vertex_count()];
    let mut corners: Vec<Option<Vec<usize>>> = vec![None; face_count];

    let root = root_face(mesh);
    let face = mesh.face(root);
    let start = mesh.vertex(face.vertices()[0]);
    let next = mesh.vertex(face.vertices()[1]);
    let placed = place_face(mesh, root, 0, Point2::origin(), Point2::new((next - start).norm(), 0.0));
    corners[root] = Some(assign_copies(
        mesh,
        root,
        &placed,
        &mut layout,
        &mut copies,
        weld,
        split,
        &[],
    ));

    let mut queue = VecDeque::from([root]);
    let mut visited = 1;
    let mut seams = 0;
    while let Some(f) = queue.pop_front() {
        let Some(f_corners) = corners[f].clone() else {
            continue;
        };
        for n in mesh.adjacency().neighbors(f) {
            if corners[n.face].is_some() {
                continue;
            }
            clock.check(visited)?;

            // `f` walks the shared edge a → b, so the neighbour walks b → a.
            let (a, b) = n.edge;
            let f_face = mesh.face(f);
            let (Some(ca), Some(cb)) = (f_face.corner_of(a), f_face.corner_of(b)) else {
                continue;
            };
            let (flat_a, flat_b) = (f_corners[ca], f_corners[cb]);

            let g_face = mesh.face(n.face);
            let Some(g_start) = g_face.corner_of(b) else {
                continue;
            };
            let placed = place_face(
                mesh,
                n.face,
                g_start,
                layout.positions[flat_b],
                layout.positions[flat_a],
            );
            let before = layout.positions.len();
            let fixed = [(b, flat_b), (a, flat_a)];
            let assigned = assign_copies(
                mesh,
                n.face,
                &placed,
                &mut layout,
                &mut copies,
                weld,
                split,
                &fixed,
            );
            seams += assigned
                .iter()
                .filter(|&&c| c >= before && copies[layout.sources[c]].len() > 1)
                .count();
            corners[n.face] = Some(assigned);
            visited += 1;
            queue.push_back(n.face);
        }
    }

    layout.corners = corners.into_iter().map(Option::unwrap_or_default).collect();
    layout.iterations = visited;
    if !split {
        index_by_vertex(&mut layout, mesh.vertex_count());
    }
    debug!(
        faces = face_count,
        flat_vertices = layout.positions.len(),
        seams,
        "rigid unfolding finished"
    );
    if seams > 0 {
        warn!(seams, "rigid unfolding cut the surface open along seams");
    }
    Ok(layout)
}

/// Renumbers a seamless layout so flat vertex `i` is mesh vertex `i`.
fn index_by_vertex(layout: &mut Layout, vertex_count: usize) {
    let mut positions = vec![Point2::origin(); vertex_count];
    for (&v, &p) in layout.sources.iter().zip(&layout.positions) {
        positions[v] = p;
    }
    for face in &mut layout.corners {
        for c in face.iter_mut() {
            *c = layout.sources[*c];
        }
    }
    layout.positions = positions;
    layout.sources = (0..vertex_count).collect();
}

/// Largest face; ties go to the lowest index.
fn root_face(mesh: &Mesh) -> usize {
    let mut best = 0;
    for (i, face) in mesh.faces().iter().enumerate().skip(1) {
        if face.area() > mesh.face(best).area() {
            best = i;
        }
    }
    best
}

/// Lays face `f` into the plane so that its corner `start` lands on `q0` and
/// the edge towards the following corner points at `q1`.
///
/// Corner coordinates are measured in the face's own plane, so every edge
/// from `start` keeps its 3D length and the face keeps its winding.
fn place_face(mesh: &Mesh, f: usize, start: usize, q0: Point2, q1: Point2) -> Vec<Point2> {
    let face = mesh.face(f);
    let verts = face.vertices();
    let n = verts.len();
    let p0 = mesh.vertex(verts[start]);
    let p1 = mesh.vertex(verts[(start + 1) % n]);

    let x_axis = (p1 - p0).normalize();
    let y_axis = face.normal().cross(&x_axis);
    let u = (q1 - q0).normalize();
    let w = perp(u);

    verts
        .iter()
        .map(|&v| {
            let d = mesh.vertex(v) - p0;
            q0 + u * d.dot(&x_axis) + w * d.dot(&y_axis)
        })
        .collect()
}

/// Maps each corner of face `f` to a flat vertex. `fixed` corners reuse the
/// given copies. Without `split` a placed vertex always reuses its first
/// copy; with it, a copy within `weld` distance is reused and a new one is
/// created otherwise.
#[allow(clippy::too_many_arguments)]
fn assign_copies(
    mesh: &Mesh,
    f: usize,
    placed: &[Point2],
    layout: &mut Layout,
    copies: &mut [Vec<usize>],
    weld: f64,
    split: bool,
    fixed: &[(usize, usize)],
) -> Vec<usize> {
    mesh.face(f)
        .vertices()
        .iter()
        .zip(placed)
        .map(|(&v, &q)| {
            if let Some(&(_, flat)) = fixed.iter().find(|(mv, _)| *mv == v) {
                return flat;
            }
            if !split {
                if let Some(&c) = copies[v].first() {
                    return c;
                }
            }
            let nearest = copies[v]
                .iter()
                .copied()
                .map(|c| (c, (layout.positions[c] - q).norm()))
                .filter(|&(_, dist)| dist <= weld)
                .min_by(|x, y| x.1.total_cmp(&y.1));
            if let Some((c, _)) = nearest {
                return c;
            }
            let c = layout.positions.len();
            layout.positions.push(q);
            layout.sources.push(v);
            copies[v].push(c);
            c
        })
        .collect()
}
