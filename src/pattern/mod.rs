//! Placement-ready 2D patterns.
//!
//! A pattern is an outer boundary (counter-clockwise), zero or more holes
//! (clockwise), the fold lines drawn on it and the rotations the nesting
//! engine may apply to it.

mod build;
mod store;

pub use build::BuildPattern;
pub use store::{PatternId, PatternStore};

use std::f64::consts::TAU;

use crate::error::{PatternError, Result};
use crate::fold::FoldLine;
use crate::math::intersect_2d::segments_intersect;
use crate::math::{polygon_2d, rotate_point, Aabb2, Point2, Vector2, TOLERANCE};

/// Rotations the nesting engine may apply to a pattern.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RotationConstraint {
    /// Fixed orientation.
    #[default]
    None,
    /// Any angle; sampled at evenly spaced steps during nesting.
    Free,
    /// Listed angles in radians.
    Discrete(Vec<f64>),
}

impl RotationConstraint {
    /// Multiples of 90°.
    #[must_use]
    pub fn axis_aligned() -> Self {
        Self::Discrete(vec![
            0.0,
            std::f64::consts::FRAC_PI_2,
            std::f64::consts::PI,
            3.0 * std::f64::consts::FRAC_PI_2,
        ])
    }

    /// Listed angles given in degrees.
    #[must_use]
    pub fn from_degrees(degrees: &[f64]) -> Self {
        if degrees.is_empty() {
            return Self::None;
        }
        Self::Discrete(degrees.iter().map(|d| d.to_radians()).collect())
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Candidate angles in evaluation order; `free_steps` samples a full
    /// turn for [`RotationConstraint::Free`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn angles(&self, free_steps: usize) -> Vec<f64> {
        match self {
            Self::None => vec![0.0],
            Self::Discrete(angles) if angles.is_empty() => vec![0.0],
            Self::Discrete(angles) => angles.clone(),
            Self::Free => {
                let steps = free_steps.max(1);
                (0..steps)
                    .map(|i| TAU * i as f64 / steps as f64)
                    .collect()
            }
        }
    }
}

/// A flat part to be cut from sheet material.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    outer: Vec<Point2>,
    holes: Vec<Vec<Point2>>,
    fold_lines: Vec<FoldLine>,
    rotation: RotationConstraint,
}

impl Pattern {
    /// Builds a pattern from an outer boundary and holes.
    ///
    /// Orientation is normalised (outer counter-clockwise, holes clockwise)
    /// and collinear runs are simplified.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::DegeneratePattern` if a loop has fewer than
    /// three distinct points or zero area, or boundary segments cross.
    pub fn from_polygon(outer: Vec<Point2>, holes: Vec<Vec<Point2>>) -> Result<Self> {
        let outer = normalize_loop(&outer, true, "outer boundary")?;
        let holes = holes
            .iter()
            .enumerate()
            .map(|(i, h)| normalize_loop(h, false, &format!("hole {i}")))
            .collect::<Result<Vec<_>>>()?;

        let mut loops = Vec::with_capacity(holes.len() + 1);
        loops.push(outer.as_slice());
        loops.extend(holes.iter().map(Vec::as_slice));
        check_simple(&loops)?;

        Ok(Self {
            outer,
            holes,
            fold_lines: Vec::new(),
            rotation: RotationConstraint::None,
        })
    }

    /// Axis-aligned `width` × `height` rectangle with its min corner at the origin.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::DegeneratePattern` for a non-positive size.
    pub fn rectangle(width: f64, height: f64) -> Result<Self> {
        if !(width > TOLERANCE && height > TOLERANCE) {
            return Err(PatternError::DegeneratePattern(format!(
                "rectangle size {width} x {height} must be positive"
            ))
            .into());
        }
        Self::from_polygon(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(width, 0.0),
                Point2::new(width, height),
                Point2::new(0.0, height),
            ],
            Vec::new(),
        )
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationConstraint) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_fold_lines(mut self, fold_lines: Vec<FoldLine>) -> Self {
        self.fold_lines = fold_lines;
        self
    }

    /// Outer boundary, counter-clockwise.
    #[must_use]
    pub fn outer(&self) -> &[Point2] {
        &self.outer
    }

    /// Holes, each clockwise.
    #[must_use]
    pub fn holes(&self) -> &[Vec<Point2>] {
        &self.holes
    }

    #[must_use]
    pub fn fold_lines(&self) -> &[FoldLine] {
        &self.fold_lines
    }

    #[must_use]
    pub fn rotation(&self) -> &RotationConstraint {
        &self.rotation
    }

    /// Outer area minus hole area.
    #[must_use]
    pub fn area(&self) -> f64 {
        polygon_2d::signed_area(&self.outer)
            - self
                .holes
                .iter()
                .map(|h| polygon_2d::signed_area(h).abs())
                .sum::<f64>()
    }

    /// Total cut length: outer boundary plus holes.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        polygon_2d::perimeter(&self.outer)
            + self
                .holes
                .iter()
                .map(|h| polygon_2d::perimeter(h))
                .sum::<f64>()
    }

    #[must_use]
    pub fn aabb(&self) -> Aabb2 {
        // The outer loop always has at least three points.
        Aabb2::from_points(&self.outer).unwrap_or(Aabb2 {
            min: Point2::origin(),
            max: Point2::origin(),
        })
    }

    /// Bounding box of the pattern rotated by `angle` about the origin.
    #[must_use]
    pub fn aabb_at_rotation(&self, angle: f64) -> Aabb2 {
        let rotated = polygon_2d::rotate_polygon(&self.outer, angle);
        Aabb2::from_points(&rotated).unwrap_or(Aabb2 {
            min: Point2::origin(),
            max: Point2::origin(),
        })
    }

    /// Convex hull of the outer boundary.
    #[must_use]
    pub fn convex_hull(&self) -> Vec<Point2> {
        polygon_2d::convex_hull(&self.outer)
    }

    /// `true` if `p` lies in the material (inside the outer boundary and
    /// not strictly inside a hole).
    #[must_use]
    pub fn contains_point(&self, p: &Point2) -> bool {
        if !polygon_2d::contains_point(&self.outer, p) {
            return false;
        }
        !self.holes.iter().any(|h| {
            polygon_2d::contains_point(h, p)
                && !h
                    .iter()
                    .zip(h.iter().cycle().skip(1))
                    .any(|(a, b)| crate::math::intersect_2d::point_on_segment(p, a, b))
        })
    }

    /// The pattern rotated about the origin by `angle` radians.
    #[must_use]
    pub fn rotated(&self, angle: f64) -> Self {
        self.map_points(|p| rotate_point(p, angle))
    }

    /// The pattern moved by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let offset = Vector2::new(dx, dy);
        self.map_points(|p| p + offset)
    }

    fn map_points(&self, f: impl Fn(&Point2) -> Point2) -> Self {
        let map_loop = |pts: &[Point2]| pts.iter().map(&f).collect::<Vec<_>>();
        Self {
            outer: map_loop(self.outer.as_slice()),
            holes: self.holes.iter().map(|h| map_loop(h.as_slice())).collect(),
            fold_lines: self
                .fold_lines
                .iter()
                .map(|l| FoldLine {
                    points: map_loop(l.points.as_slice()),
                    ..l.clone()
                })
                .collect(),
            rotation: self.rotation.clone(),
        }
    }
}

/// Simplifies a loop and orients it (`ccw` for outer boundaries).
fn normalize_loop(points: &[Point2], ccw: bool, what: &str) -> Result<Vec<Point2>> {
    let mut pts = polygon_2d::simplify_collinear(points);
    if pts.len() < 3 {
        return Err(PatternError::DegeneratePattern(format!(
            "{what} has {} distinct points, at least 3 are required",
            pts.len()
        ))
        .into());
    }
    let area = polygon_2d::signed_area(&pts);
    if area.abs() <= TOLERANCE {
        return Err(PatternError::DegeneratePattern(format!("{what} has zero area")).into());
    }
    if (area > 0.0) != ccw {
        pts.reverse();
    }
    Ok(pts)
}

/// Fails if two non-adjacent segments of the given loops touch or cross.
fn check_simple(loops: &[&[Point2]]) -> Result<()> {
    let segments: Vec<(usize, usize, Point2, Point2)> = loops
        .iter()
        .enumerate()
        .flat_map(|(l, pts)| {
            let n = pts.len();
            (0..n).map(move |i| (l, i, pts[i], pts[(i + 1) % n]))
        })
        .collect();

    for (i, &(la, ia, a0, a1)) in segments.iter().enumerate() {
        for &(lb, ib, b0, b1) in &segments[i + 1..] {
            if la == lb {
                let n = loops[la].len();
                if ib == (ia + 1) % n || ia == (ib + 1) % n {
                    continue;
                }
            }
            if segments_intersect(&a0, &a1, &b0, &b1) {
                return Err(PatternError::DegeneratePattern(format!(
                    "boundary segments {ia} of loop {la} and {ib} of loop {lb} intersect"
                ))
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Point2> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x0 + size, y0),
            Point2::new(x0 + size, y0 + size),
            Point2::new(x0, y0 + size),
        ]
    }

    #[test]
    fn orientation_is_normalised() {
        let mut outer = square(0.0, 0.0, 10.0);
        outer.reverse();
        let hole = square(4.0, 4.0, 2.0);
        let p = Pattern::from_polygon(outer, vec![hole]).unwrap();
        assert!(polygon_2d::signed_area(p.outer()) > 0.0);
        assert!(polygon_2d::signed_area(&p.holes()[0]) < 0.0);
        assert_abs_diff_eq!(p.area(), 96.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.perimeter(), 48.0, epsilon = 1e-12);
    }

    #[test]
    fn bow_tie_is_degenerate() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 0.0),
            Point2::new(0.0, 2.0),
        ];
        let err = Pattern::from_polygon(outer, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("degenerate pattern"));
    }

    #[test]
    fn hole_crossing_outer_is_degenerate() {
        let err =
            Pattern::from_polygon(square(0.0, 0.0, 4.0), vec![square(3.0, 1.0, 2.0)]).unwrap_err();
        assert!(err.to_string().contains("intersect"));
    }

    #[test]
    fn collinear_points_are_removed() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let p = Pattern::from_polygon(outer, Vec::new()).unwrap();
        assert_eq!(p.outer().len(), 4);
    }

    #[test]
    fn rectangle_rejects_zero_size() {
        assert!(Pattern::rectangle(0.0, 1.0).is_err());
        let r = Pattern::rectangle(3.0, 2.0).unwrap();
        assert_abs_diff_eq!(r.aabb().area(), 6.0);
    }

    #[test]
    fn rotated_bounds() {
        let r = Pattern::rectangle(3.0, 1.0).unwrap();
        let b = r.aabb_at_rotation(FRAC_PI_2);
        assert_abs_diff_eq!(b.width(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.height(), 3.0, epsilon = 1e-12);
        let moved = r.rotated(FRAC_PI_2).translated(1.0, 0.0);
        let mb = moved.aabb();
        assert_abs_diff_eq!(mb.min.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moved.area(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn points_in_holes_are_outside() {
        let p = Pattern::from_polygon(square(0.0, 0.0, 10.0), vec![square(4.0, 4.0, 2.0)]).unwrap();
        assert!(p.contains_point(&Point2::new(1.0, 1.0)));
        assert!(!p.contains_point(&Point2::new(5.0, 5.0)));
        assert!(p.contains_point(&Point2::new(4.0, 5.0)));
        assert!(!p.contains_point(&Point2::new(11.0, 5.0)));
    }

    #[test]
    fn hull_of_l_shape() {
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        let p = Pattern::from_polygon(outer, Vec::new()).unwrap();
        let hull = p.convex_hull();
        assert_eq!(hull.len(), 5);
        assert_abs_diff_eq!(polygon_2d::signed_area(&hull), 3.5, epsilon = 1e-12);
    }

    #[test]
    fn rotation_candidates() {
        assert_eq!(RotationConstraint::None.angles(8), vec![0.0]);
        assert_eq!(RotationConstraint::Free.angles(4).len(), 4);
        assert_eq!(RotationConstraint::axis_aligned().angles(8).len(), 4);
        assert_eq!(RotationConstraint::from_degrees(&[]), RotationConstraint::None);
    }
}
