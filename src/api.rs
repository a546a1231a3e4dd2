//! Request/response entry points for the unfolding and nesting services.
//!
//! Requests carry plain arrays so they can be deserialized straight from the
//! transport layer (enable the `serde` feature).

use tracing::debug;

use crate::budget::SolverBudget;
use crate::error::{DistortionExceeded, Result};
use crate::flatten::{Algorithm, DistortionReport, FlattenParams, PinSelection, Unfold};
use crate::fold::{ExtractFoldLines, FoldKind, FoldParams};
use crate::math::{Aabb2, Point2};
use crate::mesh::Mesh;
use crate::nesting::{MaterialSheet, Nest, NestingConfig, NestingStrategy};
use crate::pattern::{BuildPattern, Pattern, PatternStore, RotationConstraint};

/// Mesh to unfold and how.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnfoldRequest {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Vec<usize>>,
    /// `"simple"` or `"lscm"`.
    pub algorithm: String,
    /// Per-face distortion limit, 0 = exact. For `"lscm"` this is the
    /// principal stretch ratio minus one (send 0.1 to allow a ratio of 1.1).
    pub tolerance: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub generate_fold_lines: bool,
    /// Explicit pinned vertex pair for the conformal map.
    #[cfg_attr(feature = "serde", serde(default))]
    pub pins: Option<[usize; 2]>,
    /// Cut rigid unfoldings open at vertices that cannot close in the plane.
    #[cfg_attr(feature = "serde", serde(default))]
    pub split_seams: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub budget: SolverBudget,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fold: Option<FoldParams>,
}

impl UnfoldRequest {
    #[must_use]
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<Vec<usize>>, algorithm: &str, tolerance: f64) -> Self {
        Self {
            vertices,
            faces,
            algorithm: algorithm.to_owned(),
            tolerance,
            generate_fold_lines: false,
            pins: None,
            split_seams: false,
            budget: SolverBudget::default(),
            fold: None,
        }
    }

    #[must_use]
    pub fn with_fold_lines(mut self, generate: bool) -> Self {
        self.generate_fold_lines = generate;
        self
    }
}

/// A polygon with holes in plain coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternData {
    pub outer: Vec<[f64; 2]>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub holes: Vec<Vec<[f64; 2]>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub area: f64,
    /// `[min_x, min_y, max_x, max_y]`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub bounds: [f64; 4],
}

impl From<&Pattern> for PatternData {
    fn from(pattern: &Pattern) -> Self {
        let Aabb2 { min, max } = pattern.aabb();
        Self {
            outer: to_pairs(pattern.outer()),
            holes: pattern.holes().iter().map(|h| to_pairs(h)).collect(),
            area: pattern.area(),
            bounds: [min.x, min.y, max.x, max.y],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FoldLineData {
    pub points: Vec<[f64; 2]>,
    pub kind: FoldKind,
    /// Signed bend in degrees.
    pub angle: f64,
}

/// Result of an unfold request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnfoldResponse {
    pub algorithm: Algorithm,
    pub pattern: PatternData,
    pub fold_lines: Vec<FoldLineData>,
    pub distortion: DistortionReport,
    /// Present when some faces exceed the tolerance.
    pub warning: Option<DistortionExceeded>,
    pub iterations: usize,
}

/// Flattens a mesh into a pattern, optionally with fold lines.
///
/// Exceeding the distortion tolerance is reported in
/// [`UnfoldResponse::warning`] and does not fail the request.
///
/// # Errors
///
/// Returns the mesh, solver and pattern errors of the underlying
/// operations, and `SheetfoldError::InvalidInput` for an unknown algorithm.
pub fn unfold(request: &UnfoldRequest) -> Result<UnfoldResponse> {
    let algorithm: Algorithm = request.algorithm.parse()?;
    let mesh = Mesh::from_arrays(&request.vertices, &request.faces)?;

    let mut params = FlattenParams::default()
        .with_tolerance(request.tolerance)
        .with_split_seams(request.split_seams)
        .with_budget(request.budget);
    if let Some([a, b]) = request.pins {
        params = params.with_pins(PinSelection::Explicit(a, b));
    }
    let flat = Unfold::new(&mesh)
        .with_algorithm(algorithm)
        .with_params(params)
        .execute()?;

    let fold_lines = if request.generate_fold_lines {
        ExtractFoldLines::new(&mesh, &flat)
            .with_params(request.fold.unwrap_or_default())
            .execute()?
    } else {
        Vec::new()
    };
    let pattern = BuildPattern::new(&flat)
        .with_fold_lines(fold_lines)
        .execute()?;
    debug!(
        %algorithm,
        area = pattern.area(),
        folds = pattern.fold_lines().len(),
        "unfold request served"
    );

    Ok(UnfoldResponse {
        algorithm,
        fold_lines: pattern
            .fold_lines()
            .iter()
            .map(|l| FoldLineData {
                points: to_pairs(&l.points),
                kind: l.kind,
                angle: l.angle.to_degrees(),
            })
            .collect(),
        pattern: PatternData::from(&pattern),
        warning: flat.report.warning(),
        distortion: flat.report,
        iterations: flat.iterations,
    })
}

/// One pattern to nest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestingPattern {
    pub outer: Vec<[f64; 2]>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub holes: Vec<Vec<[f64; 2]>>,
    /// Allowed rotations in degrees; empty means fixed orientation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rotations: Vec<f64>,
    /// Any rotation is allowed (overrides `rotations`).
    #[cfg_attr(feature = "serde", serde(default))]
    pub free_rotation: bool,
}

/// Patterns and stock for a nesting request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestingRequest {
    pub patterns: Vec<NestingPattern>,
    pub sheets: Vec<MaterialSheet>,
    /// Strategy name; only `"best_fit_decreasing"` is available.
    #[cfg_attr(feature = "serde", serde(default))]
    pub strategy: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub config: Option<NestingConfig>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacementData {
    /// Index of the pattern in the request.
    pub pattern: usize,
    pub sheet: usize,
    pub x: f64,
    pub y: f64,
    /// Rotation in degrees.
    pub rotation: f64,
}

/// Result of a nesting request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NestingResponse {
    pub placements: Vec<PlacementData>,
    pub sheets_used: usize,
    pub sheet_utilization: Vec<f64>,
    pub utilization: f64,
    pub computation_time_ms: u64,
}

/// Lays the requested patterns out on the requested sheets.
///
/// # Errors
///
/// Returns `PatternError::DegeneratePattern` for an invalid polygon,
/// `SheetfoldError::InvalidInput` for an unknown strategy or bad sheets,
/// and the nesting errors of [`Nest::execute`].
pub fn optimize_nesting(request: &NestingRequest) -> Result<NestingResponse> {
    let mut config = request.config.unwrap_or_default();
    if let Some(name) = &request.strategy {
        config.strategy = name.parse::<NestingStrategy>()?;
    }

    let store = request
        .patterns
        .iter()
        .map(|p| -> Result<Pattern> {
            let rotation = if p.free_rotation {
                RotationConstraint::Free
            } else {
                RotationConstraint::from_degrees(&p.rotations)
            };
            Ok(Pattern::from_polygon(
                to_points(&p.outer),
                p.holes.iter().map(|h| to_points(h)).collect(),
            )?
            .with_rotation(rotation))
        })
        .collect::<Result<PatternStore>>()?;

    let result = Nest::new(&store)
        .with_sheets(request.sheets.clone())
        .with_config(config)
        .execute()?;

    Ok(NestingResponse {
        placements: result
            .placements
            .iter()
            .map(|p| PlacementData {
                pattern: p.index,
                sheet: p.sheet,
                x: p.position.x,
                y: p.position.y,
                rotation: p.rotation.to_degrees(),
            })
            .collect(),
        sheets_used: result.sheets_used(),
        sheet_utilization: result.sheet_utilization,
        utilization: result.utilization,
        computation_time_ms: result.computation_time_ms,
    })
}

fn to_pairs(points: &[Point2]) -> Vec<[f64; 2]> {
    points.iter().map(|p| [p.x, p.y]).collect()
}

fn to_points(pairs: &[[f64; 2]]) -> Vec<Point2> {
    pairs.iter().map(|&[x, y]| Point2::new(x, y)).collect()
}
