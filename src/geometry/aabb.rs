//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};

use super::Ray;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) bounding box.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Create a bounding box from min and max points.
    #[must_use]
    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create a bounding box from a triangle.
    #[must_use]
    pub fn from_triangle(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> Self {
        Self {
            min: v0.inf(v1).inf(v2),
            max: v0.sup(v1).sup(v2),
        }
    }

    /// Create the tightest box around a set of points, or `None` if empty.
    pub fn from_points<'a, It>(points: It) -> Option<Self>
    where
        It: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::from_min_max(*first, *first);
        for p in iter {
            bbox.expand_point(p);
        }
        Some(bbox)
    }

    /// Expand this bounding box to include another.
    pub fn expand(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Expand this bounding box to include a point.
    pub fn expand_point(&mut self, point: &Point3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Get the center of this bounding box.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Get the extent (size) along each axis.
    #[must_use]
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Length of the box diagonal.
    #[must_use]
    pub fn diagonal_length(&self) -> f64 {
        self.extent().norm()
    }

    /// Get the index of the longest axis (0=X, 1=Y, 2=Z).
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let d = self.extent();
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Get the surface area of this bounding box.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        if !self.is_valid() {
            return 0.0;
        }
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Check if this bounding box is valid (non-empty).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Pad this bounding box by a given amount in all directions.
    #[must_use]
    pub fn padded(&self, padding: f64) -> Self {
        let pad = Vector3::repeat(padding);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Check whether a point lies inside or on the box.
    #[must_use]
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Squared distance from a point to the box (zero inside).
    ///
    /// This is a lower bound on the squared distance from `p` to anything
    /// contained in the box.
    #[must_use]
    pub fn squared_distance_to_point(&self, p: &Point3<f64>) -> f64 {
        let mut d2 = 0.0;
        for i in 0..3 {
            let below = self.min[i] - p[i];
            let above = p[i] - self.max[i];
            let gap = below.max(above).max(0.0);
            d2 += gap * gap;
        }
        d2
    }

    /// Whether a closed ball touches the box.
    #[must_use]
    pub fn intersects_ball(&self, center: &Point3<f64>, radius: f64) -> bool {
        self.squared_distance_to_point(center) <= radius * radius
    }

    /// Slab test: the parameter interval over which `ray` is inside the box,
    /// clipped to `[t_min, t_max]`.
    ///
    /// Axes along which the direction is exactly zero are handled without
    /// dividing, so a ray lying in a slab plane is not rejected by a NaN.
    #[must_use]
    pub fn ray_interval(&self, ray: &Ray, t_min: f64, t_max: f64) -> Option<(f64, f64)> {
        let mut lo = t_min;
        let mut hi = t_max;
        for i in 0..3 {
            let o = ray.origin[i];
            if ray.direction[i] == 0.0 {
                if o < self.min[i] || o > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = ray.inv_direction[i];
            let mut t0 = (self.min[i] - o) * inv;
            let mut t1 = (self.max[i] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            lo = lo.max(t0);
            hi = hi.min(t1);
            if lo > hi {
                return None;
            }
        }
        Some((lo, hi))
    }
}
