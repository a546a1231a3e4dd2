pub mod intersect_2d;
pub mod polygon_2d;

pub use polygon_2d::Aabb2;

/// 2D point type.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 2D vector type.
pub type Vector2 = nalgebra::Vector2<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Rotates a vector by +90° (counter-clockwise).
#[must_use]
pub fn perp(v: Vector2) -> Vector2 {
    Vector2::new(-v.y, v.x)
}

/// 2D cross product (z component of the 3D cross product).
#[must_use]
pub fn cross_2d(a: &Vector2, b: &Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Rotates a point about the origin by `angle` radians.
#[must_use]
pub fn rotate_point(p: &Point2, angle: f64) -> Point2 {
    let (s, c) = angle.sin_cos();
    Point2::new(p.x * c - p.y * s, p.x * s + p.y * c)
}
