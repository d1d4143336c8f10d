//! Rays with validated, unit-length directions.

use nalgebra::{Point3, Vector3};

/// A ray `origin + t * direction` with `direction` normalised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Ray origin.
    pub origin: Point3<f64>,
    /// Unit direction.
    pub direction: Vector3<f64>,
    /// Component-wise reciprocal of `direction` (infinite on zero components).
    pub inv_direction: Vector3<f64>,
}

impl Ray {
    /// Create a ray, normalising `direction`.
    ///
    /// Returns `None` when the origin is not finite or the direction has zero
    /// length or a non-finite component.
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Option<Self> {
        if !origin.iter().all(|c| c.is_finite()) || !direction.iter().all(|c| c.is_finite()) {
            return None;
        }
        let norm = direction.norm();
        if norm == 0.0 || !norm.is_finite() {
            return None;
        }
        let direction = direction / norm;
        Some(Self {
            origin,
            direction,
            inv_direction: direction.map(|c| 1.0 / c),
        })
    }

    /// Point at parameter `t`.
    #[inline]
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_is_normalised() {
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((ray.direction.norm() - 1.0).abs() < 1e-12);
        assert!((ray.at(5.0) - Point3::new(0.0, 3.0, 4.0)).norm() < 1e-12);
    }

    #[test]
    fn test_degenerate_rays_rejected() {
        assert!(Ray::new(Point3::origin(), Vector3::zeros()).is_none());
        assert!(Ray::new(Point3::origin(), Vector3::new(f64::NAN, 0.0, 1.0)).is_none());
        assert!(Ray::new(Point3::new(f64::INFINITY, 0.0, 0.0), Vector3::x()).is_none());
    }
}
