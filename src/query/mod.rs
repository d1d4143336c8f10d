//! Geometric queries against a mesh.
//!
//! Both engines borrow the mesh, build its spatial index on first use and
//! answer batches of independent queries:
//!
//! - [`nearest`]: closest surface point, nearest vertex, signed distance
//! - [`ray`]: hit locations, first hit, any hit, point containment
//!
//! Batches run on the rayon thread pool unless the options ask for
//! sequential processing; results are identical either way.

pub mod nearest;
pub mod ray;

pub use nearest::{ClosestPoints, NearestOptions, NearestQuery, SurfacePoint};
pub use ray::{RayHits, RayOptions, RayQuery};
