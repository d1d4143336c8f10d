//! # surfquery
//!
//! Spatial queries over triangle meshes: closest surface points, ray
//! intersections and ball-neighbourhood curvature.
//!
//! A [`TriMesh`](mesh::TriMesh) owns its vertex positions and triangles and
//! lazily builds a bounding volume hierarchy the first time a query needs
//! one. Queries borrow the mesh immutably and process batches of points or
//! rays in parallel with rayon.
//!
//! ## Features
//!
//! - **Spatial index**: median or surface-area-heuristic BVH, built in parallel
//! - **Nearest queries**: closest point on the surface, nearest vertex, signed distance
//! - **Ray queries**: all hits with edge/vertex de-duplication, first hit, point containment
//! - **Curvature**: discrete Gaussian and mean curvature measures over balls
//! - **Processing**: Laplacian-family smoothing filters and surface sampling
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit indices
//!
//! ## Quick Start
//!
//! ```
//! use surfquery::prelude::*;
//! use surfquery::mesh::creation::icosphere;
//! use nalgebra::{Point3, Vector3};
//!
//! let sphere = icosphere(3, 1.0);
//!
//! // Closest points on the surface
//! let closest = sphere.nearest().on_surface(&[Point3::new(0.0, 0.0, 2.0)]).unwrap();
//! assert!((closest.distances[0] - 1.0).abs() < 1e-2);
//!
//! // First hit along a ray
//! let hits = sphere
//!     .ray()
//!     .intersects_first(&[Point3::new(0.0, 0.0, -3.0)], &[Vector3::z()])
//!     .unwrap();
//! assert!(hits[0].is_some());
//!
//! // A ball holding the whole unit sphere sees its full Gaussian curvature
//! let k = curvature_measure(&sphere, &[Point3::origin()], 2.5, CurvatureKind::Gaussian)
//!     .unwrap();
//! assert!((k[0] - 1.0).abs() < 1e-9);
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use surfquery::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1],  // bottom
//!     [0, 1, 3],  // front
//!     [1, 2, 3],  // right
//!     [2, 0, 3],  // left
//! ];
//!
//! let mesh: TriMesh = TriMesh::new(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 4);
//! assert!(mesh.volume() > 0.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod query;
pub mod spatial;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use surfquery::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::curvature::{curvature_measure, CurvatureKind};
    pub use crate::error::{MeshError, Result};
    pub use crate::geometry::{Aabb, Ray};
    pub use crate::mesh::{FaceId, MeshIndex, TriMesh, VertexId};
    pub use crate::query::{NearestOptions, RayOptions};
    pub use crate::spatial::{IndexOptions, SpatialIndex, SplitRule};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_tetrahedron_queries() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];

        let faces = vec![
            [0, 2, 1], // bottom
            [0, 1, 3], // front
            [1, 2, 3], // right
            [2, 0, 3], // left
        ];

        let mesh: TriMesh = TriMesh::new(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 4);
        assert!((mesh.volume() - 1.0 / 6.0).abs() < 1e-12);

        let inside = Point3::new(0.5, 0.4, 0.2);
        let outside = Point3::new(0.5, 0.4, -0.2);
        assert_eq!(mesh.ray().contains_points(&[inside, outside]).unwrap(), vec![true, false]);

        let below = mesh.nearest().closest_point(&outside).unwrap();
        assert!((below.distance - 0.2).abs() < 1e-12);
        assert_eq!(below.face, FaceId::new(0));

        let hit = mesh
            .ray()
            .intersects_first(&[outside], &[Vector3::z()])
            .unwrap();
        assert_eq!(hit, vec![Some(FaceId::new(0))]);
    }
}
