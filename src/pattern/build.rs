use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{check_simple, Pattern, RotationConstraint};
use crate::error::{PatternError, Result};
use crate::flatten::FlattenResult;
use crate::fold::FoldLine;
use crate::math::{polygon_2d, Point2};
use crate::mesh::cyclic_edges;

/// Builds a [`Pattern`] from a flattening.
///
/// The cut boundary is made of the flat face edges without a reverse twin.
/// They are chained into loops; the loop with the largest area becomes the
/// outer boundary and all others become holes.
#[derive(Debug)]
pub struct BuildPattern<'a> {
    flat: &'a FlattenResult,
    fold_lines: Vec<FoldLine>,
    rotation: RotationConstraint,
}

impl<'a> BuildPattern<'a> {
    #[must_use]
    pub fn new(flat: &'a FlattenResult) -> Self {
        Self {
            flat,
            fold_lines: Vec::new(),
            rotation: RotationConstraint::None,
        }
    }

    #[must_use]
    pub fn with_fold_lines(mut self, fold_lines: Vec<FoldLine>) -> Self {
        self.fold_lines = fold_lines;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationConstraint) -> Self {
        self.rotation = rotation;
        self
    }

    /// Extracts the boundary loops and assembles the pattern.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::DegeneratePattern` if the flattening has no
    /// boundary, a boundary loop does not close, or the layout overlaps
    /// itself so that boundary segments cross.
    pub fn execute(&self) -> Result<Pattern> {
        let loops = boundary_loops(self.flat)?;

        let points: Vec<Vec<Point2>> = loops
            .iter()
            .map(|l| l.iter().map(|&v| self.flat.positions[v]).collect())
            .collect();
        check_crossings(&loops, &points)?;

        let Some(outer_idx) = points
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                polygon_2d::signed_area(a)
                    .abs()
                    .total_cmp(&polygon_2d::signed_area(b).abs())
            })
            .map(|(i, _)| i)
        else {
            return Err(PatternError::DegeneratePattern("flattening has no boundary".into()).into());
        };

        let mut outer = Vec::new();
        let mut holes = Vec::new();
        for (i, pts) in points.into_iter().enumerate() {
            if i == outer_idx {
                outer = pts;
            } else {
                holes.push(pts);
            }
        }
        debug!(
            outer_vertices = outer.len(),
            holes = holes.len(),
            "pattern boundary extracted"
        );

        Ok(Pattern::from_polygon(outer, holes)?
            .with_fold_lines(self.fold_lines.clone())
            .with_rotation(self.rotation.clone()))
    }
}

/// Chains the twinless directed flat edges into closed loops of flat vertex
/// indices. Loops start at their lowest unused edge, so the result is
/// deterministic.
fn boundary_loops(flat: &FlattenResult) -> Result<Vec<Vec<usize>>> {
    let directed: BTreeSet<(usize, usize)> = flat
        .corners
        .iter()
        .flat_map(|face| cyclic_edges(face).collect::<Vec<_>>())
        .collect();

    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(a, b) in &directed {
        if !directed.contains(&(b, a)) {
            outgoing.entry(a).or_default().push(b);
        }
    }

    let mut loops = Vec::new();
    loop {
        let Some(start) = outgoing
            .iter()
            .find(|(_, next)| !next.is_empty())
            .map(|(&v, _)| v)
        else {
            break;
        };
        let mut chain = vec![start];
        let mut current = start;
        loop {
            let Some(next) = outgoing.get_mut(&current).and_then(|n| {
                if n.is_empty() {
                    None
                } else {
                    Some(n.remove(0))
                }
            }) else {
                return Err(PatternError::DegeneratePattern(format!(
                    "boundary loop through flat vertex {start} does not close"
                ))
                .into());
            };
            if next == start {
                break;
            }
            chain.push(next);
            current = next;
        }
        loops.push(chain);
    }
    Ok(loops)
}

/// Fails if boundary segments that share no flat vertex touch or cross.
fn check_crossings(loops: &[Vec<usize>], points: &[Vec<Point2>]) -> Result<()> {
    // A loop visiting a flat vertex twice is pinched there.
    let shares_vertex = loops.iter().any(|l| {
        let unique: BTreeSet<usize> = l.iter().copied().collect();
        unique.len() != l.len()
    });
    if shares_vertex {
        return Err(PatternError::DegeneratePattern(
            "boundary touches itself at a vertex".into(),
        )
        .into());
    }
    let slices: Vec<&[Point2]> = points.iter().map(Vec::as_slice).collect();
    check_simple(&slices)
}
