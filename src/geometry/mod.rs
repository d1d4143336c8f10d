//! Geometric primitives and exact per-triangle tests.
//!
//! These kernels are shared by the spatial index and the query engines:
//!
//! - [`Aabb`]: axis-aligned boxes with point-distance bounds and slab tests
//! - [`Ray`]: a validated ray with a unit direction
//! - [`triangle`]: closest point on a triangle, ray-triangle intersection, angles

mod aabb;
mod ray;
pub mod triangle;

pub use aabb::Aabb;
pub use ray::Ray;
