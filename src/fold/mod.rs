//! Crease detection on the flattened pattern.
//!
//! Every interior edge whose adjacent faces are not coplanar becomes a fold
//! segment in the plane. A positive bend (the surface turns toward its
//! normals) is a valley fold seen from the front side, a negative bend a
//! mountain fold. Consecutive segments of the same kind that continue in
//! almost the same direction are chained into one polyline.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{Result, SheetfoldError};
use crate::flatten::FlattenResult;
use crate::math::{Point2, Vector2};
use crate::mesh::Mesh;

/// Direction of a fold seen from the front (outward-normal) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FoldKind {
    /// Ridge pointing toward the viewer.
    Mountain,
    /// Trough pointing away from the viewer.
    Valley,
}

impl FoldKind {
    /// Classifies a signed bend angle.
    #[must_use]
    pub fn from_bend(angle: f64) -> Self {
        if angle > 0.0 {
            Self::Valley
        } else {
            Self::Mountain
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Mountain => Self::Valley,
            Self::Valley => Self::Mountain,
        }
    }
}

impl fmt::Display for FoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mountain => f.write_str("mountain"),
            Self::Valley => f.write_str("valley"),
        }
    }
}

/// A crease polyline in flattened coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FoldLine {
    pub points: Vec<Point2>,
    pub kind: FoldKind,
    /// Mean signed bend of the mesh edges, in radians.
    pub angle: f64,
    /// Mesh edges (vertex pairs, smaller index first) the line was built from.
    pub edges: Vec<(usize, usize)>,
}

impl FoldLine {
    #[must_use]
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

/// Parameters for [`ExtractFoldLines`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FoldParams {
    /// Bends up to this magnitude (radians) are treated as flat.
    pub angle_threshold: f64,
    /// Largest direction change (radians) across which segments are chained.
    pub merge_angle: f64,
    /// Chain collinear segments into polylines.
    pub merge: bool,
}

impl Default for FoldParams {
    fn default() -> Self {
        Self {
            angle_threshold: 1e-3,
            merge_angle: 1f64.to_radians(),
            merge: true,
        }
    }
}

impl FoldParams {
    #[must_use]
    pub fn with_angle_threshold(mut self, angle_threshold: f64) -> Self {
        self.angle_threshold = angle_threshold;
        self
    }

    #[must_use]
    pub fn with_merge_angle(mut self, merge_angle: f64) -> Self {
        self.merge_angle = merge_angle;
        self
    }

    #[must_use]
    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Fold-line extraction operation.
#[derive(Debug)]
pub struct ExtractFoldLines<'a> {
    mesh: &'a Mesh,
    flat: &'a FlattenResult,
    params: FoldParams,
}

impl<'a> ExtractFoldLines<'a> {
    #[must_use]
    pub fn new(mesh: &'a Mesh, flat: &'a FlattenResult) -> Self {
        Self {
            mesh,
            flat,
            params: FoldParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: FoldParams) -> Self {
        self.params = params;
        self
    }

    /// Extracts the fold lines, ordered by their lowest interior edge.
    ///
    /// # Errors
    ///
    /// Returns `SheetfoldError::InvalidInput` if the flattening does not
    /// belong to this mesh or the thresholds are negative.
    pub fn execute(&self) -> Result<Vec<FoldLine>> {
        if self.flat.face_count() != self.mesh.face_count() {
            return Err(SheetfoldError::InvalidInput(format!(
                "flattening has {} faces, mesh has {}",
                self.flat.face_count(),
                self.mesh.face_count()
            )));
        }
        if self.params.angle_threshold < 0.0 || self.params.merge_angle < 0.0 {
            return Err(SheetfoldError::InvalidInput(
                "fold thresholds must be non-negative".into(),
            ));
        }

        let mut segments = Vec::new();
        for edge in self.mesh.adjacency().interior_edges() {
            let angle = self.mesh.bend_angle(&edge);
            if angle.abs() <= self.params.angle_threshold {
                continue;
            }
            let face = self.mesh.face(edge.left);
            let (Some(ca), Some(cb)) = (face.corner_of(edge.a), face.corner_of(edge.b)) else {
                continue;
            };
            let corners = &self.flat.corners[edge.left];
            let ends = [corners[ca], corners[cb]];
            segments.push(Segment {
                line: FoldLine {
                    points: vec![self.flat.positions[ends[0]], self.flat.positions[ends[1]]],
                    kind: FoldKind::from_bend(angle),
                    angle,
                    edges: vec![(edge.a.min(edge.b), edge.a.max(edge.b))],
                },
                ends,
            });
        }
        let count = segments.len();

        let lines = if self.params.merge {
            chain_segments(&segments, self.params.merge_angle)
        } else {
            segments.into_iter().map(|s| s.line).collect()
        };
        debug!(segments = count, lines = lines.len(), "fold lines extracted");
        Ok(lines)
    }
}

/// Extracts fold lines with default parameters.
///
/// # Errors
///
/// See [`ExtractFoldLines::execute`].
pub fn extract_fold_lines(mesh: &Mesh, flat: &FlattenResult) -> Result<Vec<FoldLine>> {
    ExtractFoldLines::new(mesh, flat).execute()
}

/// A single crease segment; `ends` are its flat vertex ids.
struct Segment {
    line: FoldLine,
    ends: [usize; 2],
}

/// Unit direction leaving end `end` of a two-point segment.
fn outgoing(line: &FoldLine, end: usize) -> Vector2 {
    let (from, to) = (line.points[end], line.points[1 - end]);
    (to - from).normalize()
}

/// Chains segments that share a flat vertex, have the same kind and turn by
/// at most `merge_angle`.
///
/// At each vertex the straightest pairs are linked first, and every segment
/// end takes at most one link, so the links form simple paths and cycles.
fn chain_segments(segments: &[Segment], merge_angle: f64) -> Vec<FoldLine> {
    let min_cos = merge_angle.cos();
    let mut at_vertex: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
    for (s, seg) in segments.iter().enumerate() {
        for (end, &v) in seg.ends.iter().enumerate() {
            at_vertex.entry(v).or_default().push((s, end));
        }
    }

    let mut links: Vec<[Option<(usize, usize)>; 2]> = vec![[None; 2]; segments.len()];
    let mut pairs = Vec::new();
    for incident in at_vertex.values() {
        pairs.clear();
        for (i, &(s, se)) in incident.iter().enumerate() {
            for &(t, te) in &incident[i + 1..] {
                if s == t || segments[s].line.kind != segments[t].line.kind {
                    continue;
                }
                // Opposite outgoing directions mean the crease runs straight on.
                let straightness =
                    -outgoing(&segments[s].line, se).dot(&outgoing(&segments[t].line, te));
                if straightness >= min_cos {
                    pairs.push((straightness, (s, se), (t, te)));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));
        for &(_, (s, se), (t, te)) in &pairs {
            if links[s][se].is_none() && links[t][te].is_none() {
                links[s][se] = Some((t, te));
                links[t][te] = Some((s, se));
            }
        }
    }

    let mut visited = vec![false; segments.len()];
    let mut lines = Vec::new();
    for first in 0..segments.len() {
        if visited[first] {
            continue;
        }
        // Walk back to a free end; a cycle starts at `first` itself.
        let (mut s, mut entry) = (first, 0);
        while let Some((t, te)) = links[s][entry] {
            if t == first {
                (s, entry) = (first, 0);
                break;
            }
            (s, entry) = (t, 1 - te);
        }
        lines.push(walk_chain(segments, &links, &mut visited, s, entry));
    }
    lines
}

/// Collects the chain that enters segment `s` through end `entry`.
fn walk_chain(
    segments: &[Segment],
    links: &[[Option<(usize, usize)>; 2]],
    visited: &mut [bool],
    mut s: usize,
    mut entry: usize,
) -> FoldLine {
    let kind = segments[s].line.kind;
    let mut points = vec![segments[s].line.points[entry]];
    let mut edges = Vec::new();
    let mut weighted = 0.0;
    loop {
        visited[s] = true;
        let line = &segments[s].line;
        points.push(line.points[1 - entry]);
        edges.extend_from_slice(&line.edges);
        #[allow(clippy::cast_precision_loss)]
        let weight = line.edges.len() as f64;
        weighted += line.angle * weight;
        match links[s][1 - entry] {
            Some((t, te)) if !visited[t] => (s, entry) = (t, te),
            _ => break,
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let angle = weighted / edges.len() as f64;
    FoldLine {
        points,
        kind,
        angle,
        edges,
    }
}
