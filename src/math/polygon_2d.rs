use super::{cross_2d, rotate_point, Point2, TOLERANCE};

/// An axis-aligned bounding box in the plane.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb2 {
    /// Minimum corner.
    pub min: Point2,
    /// Maximum corner.
    pub max: Point2,
}

impl Aabb2 {
    /// Computes the bounding box of a point set, or `None` if it is empty.
    #[must_use]
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self {
            min: first,
            max: first,
        };
        for p in iter {
            aabb.min.x = aabb.min.x.min(p.x);
            aabb.min.y = aabb.min.y.min(p.y);
            aabb.max.x = aabb.max.x.max(p.x);
            aabb.max.y = aabb.max.y.max(p.y);
        }
        Some(aabb)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Computes the signed area of a closed polygon (shoelace formula).
///
/// Positive for counter-clockwise, negative for clockwise.
#[must_use]
pub fn signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}

/// Length of the closed polygon boundary.
#[must_use]
pub fn perimeter(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| (points[(i + 1) % n] - points[i]).norm())
        .sum()
}

/// Removes consecutive duplicates and interior vertices of straight runs.
#[must_use]
pub fn simplify_collinear(points: &[Point2]) -> Vec<Point2> {
    let mut out: Vec<Point2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_none_or(|q| (p - q).norm() > TOLERANCE) {
            out.push(*p);
        }
    }
    if out.len() > 1 && (out[0] - out[out.len() - 1]).norm() <= TOLERANCE {
        out.pop();
    }

    let mut changed = true;
    while changed && out.len() > 3 {
        changed = false;
        let n = out.len();
        for i in 0..n {
            let prev = out[(i + n - 1) % n];
            let next = out[(i + 1) % n];
            let a = out[i] - prev;
            let b = next - out[i];
            let scale = a.norm() * b.norm();
            if cross_2d(&a, &b).abs() <= 1e-9 * scale && a.dot(&b) > 0.0 {
                out.remove(i);
                changed = true;
                break;
            }
        }
    }
    out
}

/// Convex hull of a point set (Andrew's monotone chain), counter-clockwise.
#[must_use]
pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
    let mut pts: Vec<Point2> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup_by(|a, b| (*a - *b).norm() <= TOLERANCE);
    if pts.len() < 3 {
        return pts;
    }

    let turn = |o: &Point2, a: &Point2, b: &Point2| cross_2d(&(a - o), &(b - o));

    let mut lower: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in &pts {
        while lower.len() >= 2 && turn(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point2> = Vec::with_capacity(pts.len());
    for p in pts.iter().rev() {
        while upper.len() >= 2 && turn(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Even-odd point-in-polygon test. Points on the boundary count as inside.
#[must_use]
pub fn contains_point(polygon: &[Point2], p: &Point2) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if super::intersect_2d::point_on_segment(p, &a, &b) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Rotates every point of a polygon about the origin.
#[must_use]
pub fn rotate_polygon(points: &[Point2], angle: f64) -> Vec<Point2> {
    points.iter().map(|p| rotate_point(p, angle)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<Point2> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn signed_area_orientation() {
        let mut pts = square();
        assert_abs_diff_eq!(signed_area(&pts), 1.0);
        pts.reverse();
        assert_abs_diff_eq!(signed_area(&pts), -1.0);
        assert_abs_diff_eq!(signed_area(&pts[..2]), 0.0);
    }

    #[test]
    fn perimeter_of_square() {
        assert_abs_diff_eq!(perimeter(&square()), 4.0);
    }

    #[test]
    fn aabb_of_points() {
        let pts = vec![Point2::new(1.0, -2.0), Point2::new(-3.0, 4.0)];
        let aabb = Aabb2::from_points(&pts).unwrap();
        assert_abs_diff_eq!(aabb.width(), 4.0);
        assert_abs_diff_eq!(aabb.height(), 6.0);
        assert_abs_diff_eq!(aabb.area(), 24.0);
        assert!(Aabb2::from_points(&[]).is_none());
    }

    #[test]
    fn simplify_drops_midpoints() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(2.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let simple = simplify_collinear(&pts);
        assert_eq!(simple.len(), 4);
        assert_abs_diff_eq!(signed_area(&simple), 2.0);
    }

    #[test]
    fn hull_skips_interior_points() {
        let mut pts = square();
        pts.push(Point2::new(0.5, 0.5));
        pts.push(Point2::new(0.5, 0.0));
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(signed_area(&hull) > 0.0);
    }

    #[test]
    fn point_in_square() {
        let sq = square();
        assert!(contains_point(&sq, &Point2::new(0.5, 0.5)));
        assert!(contains_point(&sq, &Point2::new(1.0, 0.5)));
        assert!(!contains_point(&sq, &Point2::new(1.5, 0.5)));
    }
}
