use super::{cross_2d, Point2, TOLERANCE};

/// Bounded segment-segment intersection in 2D.
///
/// Returns `(intersection_point, t, u)` where `t` and `u` are in `[0, 1]`.
/// Parallel segments return `None`, including collinear overlaps; use
/// [`segments_intersect`] when overlaps must be detected.
#[must_use]
pub fn segment_segment_intersect_2d(
    a0: &Point2,
    a1: &Point2,
    b0: &Point2,
    b1: &Point2,
) -> Option<(Point2, f64, f64)> {
    let da = a1 - a0;
    let db = b1 - b0;

    let cross = cross_2d(&da, &db);
    if cross.abs() < TOLERANCE {
        return None;
    }

    let d = b0 - a0;
    let t = cross_2d(&d, &db) / cross;
    let u = cross_2d(&d, &da) / cross;

    // Use a small epsilon to include endpoints.
    let eps = TOLERANCE;
    if t >= -eps && t <= 1.0 + eps && u >= -eps && u <= 1.0 + eps {
        let t_clamped = t.clamp(0.0, 1.0);
        Some((a0 + da * t_clamped, t_clamped, u.clamp(0.0, 1.0)))
    } else {
        None
    }
}

/// Returns `true` if `p` lies on the closed segment `a`–`b`.
#[must_use]
pub fn point_on_segment(p: &Point2, a: &Point2, b: &Point2) -> bool {
    let ab = b - a;
    let ap = p - a;
    let len = ab.norm();
    if len < TOLERANCE {
        return ap.norm() < TOLERANCE;
    }
    if cross_2d(&ab, &ap).abs() > TOLERANCE.max(1e-9 * len) * len {
        return false;
    }
    let t = ap.dot(&ab) / (len * len);
    (-TOLERANCE..=1.0 + TOLERANCE).contains(&t)
}

/// Closed-segment intersection test that also reports collinear overlaps
/// and touching endpoints.
#[must_use]
pub fn segments_intersect(a0: &Point2, a1: &Point2, b0: &Point2, b1: &Point2) -> bool {
    if segment_segment_intersect_2d(a0, a1, b0, b1).is_some() {
        return true;
    }
    point_on_segment(b0, a0, a1)
        || point_on_segment(b1, a0, a1)
        || point_on_segment(a0, b0, b1)
        || point_on_segment(a1, b0, b1)
}
