//! Per-face distortion measures.

use crate::math::{Point2, Point3, TOLERANCE};

/// Coordinates of a triangle in its own plane: `p0` at the origin, `p1` on
/// the positive x axis and `p2` in the upper half plane.
///
/// Returns `(x1, x2, y2)`.
pub(crate) fn triangle_frame(p0: &Point3, p1: &Point3, p2: &Point3) -> (f64, f64, f64) {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let x1 = e1.norm();
    let x_axis = e1 / x1;
    let x2 = e2.dot(&x_axis);
    let y2 = (e2 - x_axis * x2).norm();
    (x1, x2, y2)
}

/// Ratio of a face's flattened edge lengths to its 3D edge lengths,
/// reported as the largest `|len2d / len3d − 1|` over the face's edges.
pub(crate) fn edge_residual(points_3d: &[Point3], points_2d: &[Point2]) -> f64 {
    let n = points_3d.len();
    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            let len3 = (points_3d[j] - points_3d[i]).norm();
            let len2 = (points_2d[j] - points_2d[i]).norm();
            if len3 < TOLERANCE {
                0.0
            } else {
                (len2 / len3 - 1.0).abs()
            }
        })
        .fold(0.0, f64::max)
}

/// Stretch of one triangle under the 3D → 2D affine map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Stretch {
    /// Largest singular value of the map.
    pub sigma_max: f64,
    /// Smallest singular value of the map.
    pub sigma_min: f64,
    /// `true` if the map reverses orientation.
    pub flipped: bool,
}

impl Stretch {
    /// Conformal distortion: `σmax / σmin − 1` (0 for a similarity).
    pub(crate) fn conformal(&self) -> f64 {
        self.sigma_max / self.sigma_min.max(TOLERANCE) - 1.0
    }
}

/// Singular values of the affine map taking a 3D triangle onto its 2D image.
#[allow(clippy::similar_names)]
pub(crate) fn triangle_stretch(tri_3d: [&Point3; 3], tri_2d: [&Point2; 3]) -> Stretch {
    let (x1, x2, y2) = triangle_frame(tri_3d[0], tri_3d[1], tri_3d[2]);
    let d1 = tri_2d[1] - tri_2d[0];
    let d2 = tri_2d[2] - tri_2d[0];

    // J = [d1 d2] * inv([[x1, x2], [0, y2]])
    let det_src = x1 * y2;
    if det_src.abs() < TOLERANCE {
        return Stretch {
            sigma_max: f64::INFINITY,
            sigma_min: 0.0,
            flipped: false,
        };
    }
    let a = d1.x / x1;
    let c = d1.y / x1;
    let b = (d2.x - a * x2) / y2;
    let d = (d2.y - c * x2) / y2;

    let e = a * a + c * c;
    let g = b * b + d * d;
    let f = a * b + c * d;
    let root = ((e - g) * (e - g) + 4.0 * f * f).sqrt();
    let sigma_max = ((e + g + root) * 0.5).sqrt();
    let sigma_min = ((e + g - root) * 0.5).max(0.0).sqrt();

    Stretch {
        sigma_max,
        sigma_min,
        flipped: a * d - b * c < 0.0,
    }
}
