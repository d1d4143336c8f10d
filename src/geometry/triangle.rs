//! Exact per-triangle geometry.
//!
//! These are the leaf tests run by the spatial index traversals. All of them
//! accept degenerate (zero-area) triangles without producing NaN.
//!
//! # References
//!
//! - Ericson, C. (2004). "Real-Time Collision Detection", §5.1.5.
//! - Möller, T., Trumbore, B. (1997). "Fast, Minimum Storage Ray-Triangle
//!   Intersection." Journal of Graphics Tools.

use nalgebra::{Point3, Vector3};

use super::Ray;

/// Barycentric slack accepted on triangle edges, so a ray through a shared
/// edge is reported by both neighbours and merged afterwards.
pub const BARYCENTRIC_TOLERANCE: f64 = 1e-9;

/// Relative determinant below which a ray is considered parallel to a triangle.
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Relative squared area below which a triangle is treated as degenerate.
const DEGENERATE_TOLERANCE: f64 = 1e-24;

/// Intersection of a ray with a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Ray parameter of the hit (distance along the unit direction).
    pub t: f64,
    /// Barycentric weight of the second vertex.
    pub u: f64,
    /// Barycentric weight of the third vertex.
    pub v: f64,
}

/// Whether a triangle has (numerically) zero area.
pub fn is_degenerate(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    let ab = b - a;
    let ac = c - a;
    let bc = c - b;
    let scale = ab.norm_squared().max(ac.norm_squared()).max(bc.norm_squared());
    if scale == 0.0 {
        return true;
    }
    ab.cross(&ac).norm_squared() <= DEGENERATE_TOLERANCE * scale * scale
}

/// Closest point to `p` on the segment `[a, b]`.
///
/// A zero-length segment collapses to `a`.
pub fn closest_point_on_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point to `p` on triangle `(a, b, c)`.
///
/// Classifies `p` into the vertex, edge or face Voronoi region of the
/// triangle. Degenerate triangles are handled as the union of their three
/// edges.
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    if is_degenerate(a, b, c) {
        return closest_point_on_degenerate(p, a, b, c);
    }

    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    // Face region
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

fn closest_point_on_degenerate(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    [
        closest_point_on_segment(p, a, b),
        closest_point_on_segment(p, b, c),
        closest_point_on_segment(p, c, a),
    ]
    .into_iter()
    .min_by(|x, y| (p - x).norm_squared().total_cmp(&(p - y).norm_squared()))
    .unwrap_or(*a)
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Edges are inclusive up to [`BARYCENTRIC_TOLERANCE`]. The returned
/// parameter is not filtered by sign; callers decide which range is
/// admissible. Rays parallel to the triangle plane and degenerate triangles
/// never hit.
pub fn ray_triangle_intersect(
    ray: &Ray,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<TriangleHit> {
    let e1 = b - a;
    let e2 = c - a;

    let pvec = ray.direction.cross(&e2);
    let det = e1.dot(&pvec);
    let scale = e1.norm() * e2.norm();
    if scale == 0.0 || det.abs() <= PARALLEL_TOLERANCE * scale {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray.origin - a;

    let u = tvec.dot(&pvec) * inv_det;
    if !(-BARYCENTRIC_TOLERANCE..=1.0 + BARYCENTRIC_TOLERANCE).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(&e1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < -BARYCENTRIC_TOLERANCE || u + v > 1.0 + BARYCENTRIC_TOLERANCE {
        return None;
    }

    let t = e2.dot(&qvec) * inv_det;
    Some(TriangleHit { t, u, v })
}

/// Compute the angle at vertex `a` in triangle (a, b, c).
///
/// Returns zero when either adjacent edge has zero length.
pub fn triangle_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let denom = ab.norm() * ac.norm();
    if denom == 0.0 {
        return 0.0;
    }
    (ab.dot(&ac) / denom).clamp(-1.0, 1.0).acos()
}

/// Interior angles at the three corners of a triangle.
pub fn triangle_angles(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> [f64; 3] {
    [
        triangle_angle(a, b, c),
        triangle_angle(b, c, a),
        triangle_angle(c, a, b),
    ]
}

/// Unit normal of a triangle (counter-clockwise winding), or zero if degenerate.
pub fn triangle_normal(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Vector3<f64> {
    (b - a)
        .cross(&(c - a))
        .try_normalize(f64::MIN_POSITIVE)
        .unwrap_or_else(Vector3::zeros)
}

/// Area of a triangle.
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}
