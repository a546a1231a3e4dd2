//! Least-squares conformal map.
//!
//! Every (fan) triangle contributes the complex equation
//! `Σ W_j U_j = 0`, where `W_j = z_{j+2} − z_{j+1}` are the triangle's
//! edge vectors in its own plane and `U_j = u_j + i v_j` are the unknown
//! flat coordinates. The equation holds exactly iff the triangle is mapped
//! by a similarity, so the least-squares solution is as close to
//! angle-preserving as the surface allows. Two pinned vertices remove the
//! similarity null space.

use nalgebra::DVector;
use tracing::debug;

use super::distortion::triangle_frame;
use super::sparse::LeastSquares;
use super::{FlattenParams, Layout, PinSelection};
use crate::budget::BudgetClock;
use crate::error::{Result, SheetfoldError, SolverError};
use crate::math::{Point2, TOLERANCE};
use crate::mesh::Mesh;

/// Flattens `mesh` with a least-squares conformal map.
///
/// # Errors
///
/// - `SolverError::SolverFailure` if the pins coincide or the system is
///   singular
/// - `SolverError::Timeout` if the budget runs out before convergence
/// - `SheetfoldError::InvalidInput` if an explicit pin is out of range
pub(super) fn unfold_conformal(
    mesh: &Mesh,
    params: &FlattenParams,
    budget_stage: &'static str,
) -> Result<Layout> {
    let (pin_a, pin_b) = select_pins(mesh, params.pins)?;
    let distance = (mesh.vertex(pin_b) - mesh.vertex(pin_a)).norm();
    if distance <= TOLERANCE * mesh.extent().max(1.0) {
        return Err(SolverError::SolverFailure(format!(
            "pinned vertices {pin_a} and {pin_b} coincide"
        ))
        .into());
    }

    let mut pinned: Vec<Option<Point2>> = vec![None; mesh.vertex_count()];
    pinned[pin_a] = Some(Point2::origin());
    pinned[pin_b] = Some(Point2::new(distance, 0.0));

    let mut column = vec![usize::MAX; mesh.vertex_count()];
    let mut free = 0;
    for (v, pin) in pinned.iter().enumerate() {
        if pin.is_none() {
            column[v] = free;
            free += 1;
        }
    }

    let triangle_count: usize = mesh.faces().iter().map(|f| f.len() - 2).sum();
    let rows = 2 * triangle_count;
    let mut triplets = Vec::with_capacity(rows * 6);
    let mut rhs = DVector::zeros(rows);

    let mut row = 0;
    for face in mesh.faces() {
        let verts = face.vertices();
        for [c0, c1, c2] in face.fan() {
            let ids = [verts[c0], verts[c1], verts[c2]];
            let (x1, x2, y2) = triangle_frame(
                &mesh.vertex(ids[0]),
                &mesh.vertex(ids[1]),
                &mesh.vertex(ids[2]),
            );
            let local = [(0.0, 0.0), (x1, 0.0), (x2, y2)];
            let weight = 1.0 / (x1 * y2).max(TOLERANCE).sqrt();

            let (re, im) = (row, row + 1);
            for j in 0..3 {
                let (xa, ya) = local[(j + 2) % 3];
                let (xb, yb) = local[(j + 1) % 3];
                let a = (xa - xb) * weight;
                let b = (ya - yb) * weight;
                let v = ids[j];
                if let Some(p) = pinned[v] {
                    rhs[re] -= a * p.x - b * p.y;
                    rhs[im] -= b * p.x + a * p.y;
                } else {
                    let (cu, cv) = (2 * column[v], 2 * column[v] + 1);
                    triplets.push((re, cu, a));
                    triplets.push((re, cv, -b));
                    triplets.push((im, cu, b));
                    triplets.push((im, cv, a));
                }
            }
            row += 2;
        }
    }

    let system = LeastSquares::from_triplets(rows, 2 * free, &triplets, rhs);
    let clock = BudgetClock::start(budget_stage, params.budget, 4 * system.ncols() + 200);
    let solution = system.solve(DVector::zeros(2 * free), params.convergence, &clock)?;
    if solution.x.iter().any(|x| !x.is_finite()) {
        return Err(SolverError::SolverFailure("solution contains non-finite values".into()).into());
    }
    debug!(
        unknowns = system.ncols(),
        equations = rows,
        iterations = solution.iterations,
        residual = solution.residual,
        pin_a,
        pin_b,
        "conformal system solved"
    );

    let positions = (0..mesh.vertex_count())
        .map(|v| {
            pinned[v].unwrap_or_else(|| {
                let k = column[v];
                Point2::new(solution.x[2 * k], solution.x[2 * k + 1])
            })
        })
        .collect();

    Ok(Layout {
        positions,
        sources: (0..mesh.vertex_count()).collect(),
        corners: mesh.faces().iter().map(|f| f.vertices().to_vec()).collect(),
        iterations: solution.iterations,
    })
}

/// Resolves the two pinned vertices.
///
/// The automatic choice is a double sweep over the boundary: the boundary
/// vertex farthest from the lowest-index boundary vertex, then the boundary
/// vertex farthest from that one. Ties go to the lower index.
fn select_pins(mesh: &Mesh, pins: PinSelection) -> Result<(usize, usize)> {
    match pins {
        PinSelection::Explicit(a, b) => {
            let n = mesh.vertex_count();
            if a >= n || b >= n {
                return Err(SheetfoldError::InvalidInput(format!(
                    "pin ({a}, {b}) out of range for {n} vertices"
                )));
            }
            if a == b {
                return Err(SolverError::SolverFailure(format!(
                    "both pins refer to vertex {a}"
                ))
                .into());
            }
            Ok((a, b))
        }
        PinSelection::Auto => {
            let mut boundary: Vec<usize> = mesh
                .adjacency()
                .boundary_edges()
                .map(|(a, _)| a)
                .collect();
            boundary.sort_unstable();
            boundary.dedup();
            let Some(&first) = boundary.first() else {
                return Err(SolverError::SolverFailure("mesh has no boundary vertex to pin".into()).into());
            };
            let farthest = |from: usize| {
                let origin = mesh.vertex(from);
                let mut best = (from, 0.0);
                for &v in &boundary {
                    let d = (mesh.vertex(v) - origin).norm();
                    if d > best.1 {
                        best = (v, d);
                    }
                }
                best.0
            };
            let a = farthest(first);
            let b = farthest(a);
            Ok((a.min(b), a.max(b)))
        }
    }
}
