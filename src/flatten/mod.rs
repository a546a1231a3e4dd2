//! Flattening of a 3D mesh into the plane.
//!
//! Two algorithms are available:
//!
//! - [`Algorithm::Simple`]: rigid unfolding, face by face, across the face
//!   adjacency graph. Exact for developable meshes. Each vertex keeps its
//!   first placement, so faces that close a ring around curvature are
//!   stretched and reported. Optionally splits such vertices into seams
//!   instead. Face overlaps are not detected here; building a pattern
//!   rejects a self-intersecting outline.
//! - [`Algorithm::Lscm`]: least-squares conformal map. Keeps the mesh in one
//!   piece and spreads the unavoidable distortion of doubly curved surfaces
//!   as angle-preserving as possible.
//!
//! Both report per-face distortion against a caller tolerance. Exceeding the
//! tolerance is a soft failure: the flattening is still returned.

pub(crate) mod distortion;
mod lscm;
mod simple;
mod sparse;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::budget::{BudgetClock, SolverBudget};
use crate::error::{DistortionExceeded, MeshError, Result, SheetfoldError};
use crate::math::{polygon_2d, Aabb2, Point2, Point3, Vector2};
use crate::mesh::Mesh;

use distortion::{edge_residual, triangle_stretch};

/// Flattening algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Algorithm {
    /// Rigid edge-by-edge unfolding.
    Simple,
    /// Least-squares conformal map.
    #[default]
    Lscm,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Lscm => f.write_str("lscm"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = SheetfoldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "lscm" => Ok(Self::Lscm),
            other => Err(SheetfoldError::InvalidInput(format!(
                "unknown flattening algorithm '{other}', expected 'simple' or 'lscm'"
            ))),
        }
    }
}

/// Which two vertices the conformal map pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PinSelection {
    /// The two boundary vertices farthest apart.
    #[default]
    Auto,
    /// Two caller-chosen vertex indices.
    Explicit(usize, usize),
}

/// Parameters for [`Unfold`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlattenParams {
    /// Largest acceptable per-face distortion, on the scale of
    /// [`DistortionReport::per_face`] (0 = none). For the conformal map a
    /// stretch-ratio limit `r` corresponds to a tolerance of `r − 1`.
    pub tolerance: f64,
    /// Distance below which two placements of one vertex are welded,
    /// relative to the mesh extent (rigid unfolding with `split_seams`).
    pub weld_tolerance: f64,
    /// Give a vertex a second flat copy when rigid unfolding reaches it at
    /// a different place, instead of stretching the face onto its first
    /// placement.
    pub split_seams: bool,
    /// Pin choice (conformal map only).
    pub pins: PinSelection,
    /// Iteration and time limits.
    pub budget: SolverBudget,
    /// Relative residual at which the linear solver stops.
    pub convergence: f64,
}

impl Default for FlattenParams {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            weld_tolerance: 1e-6,
            split_seams: false,
            pins: PinSelection::Auto,
            budget: SolverBudget::default(),
            convergence: 1e-10,
        }
    }
}

impl FlattenParams {
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_weld_tolerance(mut self, weld_tolerance: f64) -> Self {
        self.weld_tolerance = weld_tolerance;
        self
    }

    #[must_use]
    pub fn with_split_seams(mut self, split_seams: bool) -> Self {
        self.split_seams = split_seams;
        self
    }

    #[must_use]
    pub fn with_pins(mut self, pins: PinSelection) -> Self {
        self.pins = pins;
        self
    }

    #[must_use]
    pub fn with_budget(mut self, budget: SolverBudget) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_convergence(mut self, convergence: f64) -> Self {
        self.convergence = convergence;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SheetfoldError::InvalidInput(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if !self.weld_tolerance.is_finite() || self.weld_tolerance < 0.0 {
            return Err(SheetfoldError::InvalidInput(format!(
                "weld tolerance must be a non-negative number, got {}",
                self.weld_tolerance
            )));
        }
        if !(self.convergence > 0.0 && self.convergence < 1.0) {
            return Err(SheetfoldError::InvalidInput(format!(
                "convergence must lie in (0, 1), got {}",
                self.convergence
            )));
        }
        Ok(())
    }
}

/// Per-face distortion of a flattening.
///
/// For rigid unfolding a face's value is the largest relative edge-length
/// change `|len2d / len3d − 1|`. For the conformal map it is the principal
/// stretch ratio `σmax / σmin` of the face's 3D → 2D affine map, offset by
/// one so that zero means undistorted in both cases: a ratio of 1.1 is
/// reported as 0.1 and is compared against the tolerance as such.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistortionReport {
    pub per_face: Vec<f64>,
    pub max: f64,
    pub mean: f64,
    /// Flat area divided by surface area.
    pub area_ratio: f64,
    pub tolerance: f64,
    /// Faces whose distortion exceeds `tolerance`, ascending.
    pub exceeded: Vec<usize>,
    /// Faces whose orientation is reversed in the plane.
    pub flipped: Vec<usize>,
}

impl DistortionReport {
    /// The soft failure to surface, if any face exceeds the tolerance.
    #[must_use]
    pub fn warning(&self) -> Option<DistortionExceeded> {
        if self.exceeded.is_empty() {
            return None;
        }
        Some(DistortionExceeded {
            faces: self.exceeded.clone(),
            max_distortion: self.max,
            tolerance: self.tolerance,
        })
    }

    #[must_use]
    pub fn within_tolerance(&self) -> bool {
        self.exceeded.is_empty()
    }
}

/// Raw flat layout produced by an algorithm.
#[derive(Debug, Clone, Default)]
pub(crate) struct Layout {
    pub positions: Vec<Point2>,
    pub sources: Vec<usize>,
    pub corners: Vec<Vec<usize>>,
    pub iterations: usize,
}

/// A mesh laid out in the plane.
///
/// Flat vertices are indexed separately from mesh vertices. By default there
/// is exactly one flat vertex per mesh vertex, in mesh order; only rigid
/// unfolding with [`FlattenParams::split_seams`] gives a vertex on a seam one
/// flat copy per side. `corners[f][i]` is the flat vertex of
/// the `i`-th corner of face `f`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlattenResult {
    pub algorithm: Algorithm,
    pub positions: Vec<Point2>,
    pub sources: Vec<usize>,
    pub corners: Vec<Vec<usize>>,
    pub report: DistortionReport,
    pub iterations: usize,
}

impl FlattenResult {
    /// Flat position of a mesh vertex (its first copy if it lies on a seam).
    #[must_use]
    pub fn position(&self, vertex: usize) -> Option<Point2> {
        self.sources
            .iter()
            .position(|&s| s == vertex)
            .map(|i| self.positions[i])
    }

    /// Flat positions of a face's corners, in winding order.
    #[must_use]
    pub fn corner_positions(&self, face: usize) -> Vec<Point2> {
        self.corners[face]
            .iter()
            .map(|&c| self.positions[c])
            .collect()
    }

    /// `true` if any mesh vertex was split.
    #[must_use]
    pub fn has_seams(&self) -> bool {
        let mut seen = vec![false; self.sources.iter().max().map_or(0, |m| m + 1)];
        self.sources
            .iter()
            .any(|&s| std::mem::replace(&mut seen[s], true))
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.corners.len()
    }

    /// Bounding box of the flat vertices.
    #[must_use]
    pub fn aabb(&self) -> Option<Aabb2> {
        Aabb2::from_points(&self.positions)
    }

    /// Sum of the flat face areas.
    #[must_use]
    pub fn flat_area(&self) -> f64 {
        (0..self.corners.len())
            .map(|f| polygon_2d::signed_area(&self.corner_positions(f)).abs())
            .sum()
    }

    /// Converts a distortion report above tolerance into an error.
    ///
    /// # Errors
    ///
    /// Returns `SheetfoldError::Distortion` if any face exceeds the tolerance.
    pub fn check_tolerance(&self) -> Result<()> {
        match self.report.warning() {
            Some(w) => Err(w.into()),
            None => Ok(()),
        }
    }
}

/// Flattening operation.
///
/// # Example
///
/// ```
/// use sheetfold::flatten::{Algorithm, Unfold};
/// use sheetfold::mesh::Mesh;
///
/// let mesh = Mesh::from_arrays(
///     &[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
///     &[vec![0, 1, 2, 3]],
/// )
/// .unwrap();
/// let flat = Unfold::new(&mesh)
///     .with_algorithm(Algorithm::Simple)
///     .execute()
///     .unwrap();
/// assert!(flat.report.within_tolerance());
/// ```
#[derive(Debug)]
pub struct Unfold<'a> {
    mesh: &'a Mesh,
    algorithm: Algorithm,
    params: FlattenParams,
}

impl<'a> Unfold<'a> {
    #[must_use]
    pub fn new(mesh: &'a Mesh) -> Self {
        Self {
            mesh,
            algorithm: Algorithm::default(),
            params: FlattenParams::default(),
        }
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: FlattenParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.params.tolerance = tolerance;
        self
    }

    /// Runs the flattening.
    ///
    /// Distortion above tolerance does not fail the call; inspect
    /// [`FlattenResult::report`] or call [`FlattenResult::check_tolerance`].
    ///
    /// # Errors
    ///
    /// - `SheetfoldError::InvalidInput` for invalid parameters
    /// - `MeshError::InvalidMesh` if the mesh has several components
    /// - `MeshError::UnsupportedTopology` if the mesh is closed
    /// - `SolverError::SolverFailure` / `SolverError::Timeout` from the solver
    pub fn execute(&self) -> Result<FlattenResult> {
        self.params.validate()?;
        let mesh = self.mesh;
        mesh.require_single_component()?;
        if mesh.adjacency().is_closed() {
            return Err(MeshError::UnsupportedTopology(
                "closed mesh has no boundary; cut it open before flattening".into(),
            )
            .into());
        }

        let mut layout = match self.algorithm {
            Algorithm::Simple => {
                let clock = BudgetClock::start("simple", self.params.budget, usize::MAX);
                simple::unfold_rigid(mesh, &self.params, &clock)?
            }
            Algorithm::Lscm => lscm::unfold_conformal(mesh, &self.params, "lscm")?,
        };
        move_to_origin(&mut layout.positions);

        let report = self.measure(&layout);
        debug!(
            algorithm = %self.algorithm,
            faces = mesh.face_count(),
            max_distortion = report.max,
            mean_distortion = report.mean,
            area_ratio = report.area_ratio,
            "flattening finished"
        );
        if !report.exceeded.is_empty() {
            warn!(
                faces = report.exceeded.len(),
                max_distortion = report.max,
                tolerance = report.tolerance,
                "flattening exceeds distortion tolerance"
            );
        }
        if !report.flipped.is_empty() {
            warn!(faces = report.flipped.len(), "flattening contains flipped faces");
        }

        Ok(FlattenResult {
            algorithm: self.algorithm,
            positions: layout.positions,
            sources: layout.sources,
            corners: layout.corners,
            report,
            iterations: layout.iterations,
        })
    }

    fn measure(&self, layout: &Layout) -> DistortionReport {
        let mesh = self.mesh;
        let mut per_face = Vec::with_capacity(mesh.face_count());
        let mut flipped = Vec::new();
        let mut flat_area = 0.0;

        for (f, face) in mesh.faces().iter().enumerate() {
            let points_3d: Vec<Point3> = face.vertices().iter().map(|&v| mesh.vertex(v)).collect();
            let points_2d: Vec<Point2> = layout.corners[f]
                .iter()
                .map(|&c| layout.positions[c])
                .collect();
            flat_area += polygon_2d::signed_area(&points_2d).abs();

            let mut conformal: f64 = 0.0;
            let mut reversed = false;
            for [a, b, c] in face.fan() {
                let stretch = triangle_stretch(
                    [&points_3d[a], &points_3d[b], &points_3d[c]],
                    [&points_2d[a], &points_2d[b], &points_2d[c]],
                );
                conformal = conformal.max(stretch.conformal());
                reversed |= stretch.flipped;
            }
            if reversed {
                flipped.push(f);
            }
            per_face.push(match self.algorithm {
                Algorithm::Simple => edge_residual(&points_3d, &points_2d),
                Algorithm::Lscm => conformal,
            });
        }

        let max = per_face.iter().copied().fold(0.0, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = per_face.iter().sum::<f64>() / per_face.len().max(1) as f64;
        let tolerance = self.params.tolerance;
        let exceeded = per_face
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > tolerance)
            .map(|(f, _)| f)
            .collect();

        DistortionReport {
            per_face,
            max,
            mean,
            area_ratio: flat_area / mesh.area(),
            tolerance,
            exceeded,
            flipped,
        }
    }
}

/// Flattens `mesh` with default parameters and the given tolerance.
///
/// # Errors
///
/// See [`Unfold::execute`].
pub fn unfold(mesh: &Mesh, algorithm: Algorithm, tolerance: f64) -> Result<FlattenResult> {
    Unfold::new(mesh)
        .with_algorithm(algorithm)
        .with_tolerance(tolerance)
        .execute()
}

fn move_to_origin(points: &mut [Point2]) {
    if let Some(bounds) = Aabb2::from_points(points.iter()) {
        let shift: Vector2 = bounds.min.coords;
        for p in points.iter_mut() {
            *p -= shift;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::mesh::tests::{grid, hinged_square};
    use approx::assert_abs_diff_eq;

    fn tetrahedron() -> Mesh {
        Mesh::from_arrays(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            &[vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!("LSCM".parse::<Algorithm>().unwrap(), Algorithm::Lscm);
        assert_eq!(" simple ".parse::<Algorithm>().unwrap(), Algorithm::Simple);
        assert!(matches!(
            "arap".parse::<Algorithm>(),
            Err(SheetfoldError::InvalidInput(_))
        ));
        assert_eq!(Algorithm::Lscm.to_string(), "lscm");
    }

    #[test]
    fn both_algorithms_reproduce_a_flat_grid() {
        let mesh = grid(4, 3, 0.5, 0.25);
        for algorithm in [Algorithm::Simple, Algorithm::Lscm] {
            let flat = unfold(&mesh, algorithm, 1e-6).unwrap();
            assert!(flat.report.within_tolerance(), "{algorithm}");
            assert!(flat.report.flipped.is_empty());
            assert!(!flat.has_seams());
            assert_abs_diff_eq!(flat.report.area_ratio, 1.0, epsilon = 1e-6);
            let bounds = flat.aabb().unwrap();
            assert_abs_diff_eq!(bounds.min.x, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(bounds.min.y, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(flat.flat_area(), 2.0 * 0.75, epsilon = 1e-6);
        }
    }

    #[test]
    fn folded_pair_has_no_distortion() {
        let mesh = hinged_square(0.7);
        let flat = unfold(&mesh, Algorithm::Simple, 1e-9).unwrap();
        assert!(flat.check_tolerance().is_ok());
        assert_abs_diff_eq!(flat.flat_area(), mesh.area(), epsilon = 1e-9);
    }

    #[test]
    fn closed_mesh_is_unsupported() {
        let err = unfold(&tetrahedron(), Algorithm::Lscm, 0.1).unwrap_err();
        assert!(matches!(
            err,
            SheetfoldError::Mesh(MeshError::UnsupportedTopology(_))
        ));
    }

    #[test]
    fn disconnected_mesh_is_invalid() {
        let mesh = Mesh::from_arrays(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [5.0, 0.0, 0.0],
                [6.0, 0.0, 0.0],
                [5.0, 1.0, 0.0],
            ],
            &[vec![0, 1, 2], vec![3, 4, 5]],
        )
        .unwrap();
        let err = unfold(&mesh, Algorithm::Simple, 0.1).unwrap_err();
        assert!(matches!(err, SheetfoldError::Mesh(MeshError::InvalidMesh(_))));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = unfold(&grid(1, 1, 1.0, 1.0), Algorithm::Simple, -1.0).unwrap_err();
        assert!(matches!(err, SheetfoldError::InvalidInput(_)));
    }

    /// A square pyramid without its base; its apex carries curvature, so
    /// it has no flattening that is both exact and in one piece.
    fn pyramid_cap() -> Mesh {
        Mesh::from_arrays(
            &[
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, -1.0, 0.0],
            ],
            &[vec![0, 1, 2], vec![0, 2, 3], vec![0, 3, 4], vec![0, 4, 1]],
        )
        .unwrap()
    }

    #[test]
    fn rigid_unfolding_reports_residual_on_curved_cap() {
        let mesh = pyramid_cap();
        let flat = unfold(&mesh, Algorithm::Simple, 1e-9).unwrap();
        assert_eq!(flat.positions.len(), mesh.vertex_count());
        assert!(!flat.has_seams());
        assert!(flat.report.max > 0.1, "max {}", flat.report.max);
        let warning = flat.report.warning().unwrap();
        assert!(!warning.faces.is_empty());
        assert!(flat.check_tolerance().unwrap_err().is_soft());
    }

    #[test]
    fn rigid_unfolding_with_seams_is_exact_on_curved_cap() {
        let mesh = pyramid_cap();
        let flat = Unfold::new(&mesh)
            .with_algorithm(Algorithm::Simple)
            .with_params(FlattenParams::default().with_tolerance(1e-9).with_split_seams(true))
            .execute()
            .unwrap();
        assert!(flat.has_seams());
        assert_eq!(flat.positions.len(), mesh.vertex_count() + 1);
        assert!(flat.report.within_tolerance());
    }

    #[test]
    fn curved_cap_reports_distortion_softly() {
        let mesh = pyramid_cap();
        let flat = unfold(&mesh, Algorithm::Lscm, 1e-6).unwrap();
        let warning = flat.report.warning().unwrap();
        assert!(!warning.faces.is_empty());
        assert!(flat.check_tolerance().unwrap_err().is_soft());
        assert_eq!(flat.positions.len(), mesh.vertex_count());
    }

    #[test]
    fn conformal_distortion_is_stretch_ratio_minus_one() {
        let mesh = pyramid_cap();
        let flat = unfold(&mesh, Algorithm::Lscm, 1.0).unwrap();
        for f in 0..mesh.face_count() {
            let p3: Vec<Point3> = mesh.face(f).vertices().iter().map(|&v| mesh.vertex(v)).collect();
            let p2 = flat.corner_positions(f);
            let s = triangle_stretch([&p3[0], &p3[1], &p3[2]], [&p2[0], &p2[1], &p2[2]]);
            assert_abs_diff_eq!(
                flat.report.per_face[f],
                s.sigma_max / s.sigma_min - 1.0,
                epsilon = 1e-9
            );
        }
        // A stretch ratio limit of 1 + max admits every face.
        let ratio = 1.0 + flat.report.max;
        let relaxed = unfold(&mesh, Algorithm::Lscm, ratio - 1.0 + 1e-9).unwrap();
        assert!(relaxed.report.within_tolerance());
    }

    #[test]
    fn explicit_identical_pins_fail() {
        let mesh = grid(2, 2, 1.0, 1.0);
        let err = Unfold::new(&mesh)
            .with_params(FlattenParams::default().with_pins(PinSelection::Explicit(0, 0)))
            .execute()
            .unwrap_err();
        assert!(matches!(
            err,
            SheetfoldError::Solver(SolverError::SolverFailure(_))
        ));
    }
}
