//! Core mesh data structures.
//!
//! The primary type is [`TriMesh`], an indexed triangle list that owns its
//! vertex positions and lazily caches a [`SpatialIndex`](crate::spatial::SpatialIndex)
//! and an [`Adjacency`] table.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`FaceId`] - Identifies a face
//!
//! These indices are generic over the underlying integer type ([`MeshIndex`] trait),
//! allowing you to choose `u16`, `u32`, or `u64` based on mesh size.
//!
//! # Construction
//!
//! ```
//! use surfquery::mesh::TriMesh;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: TriMesh = TriMesh::new(&vertices, &faces).unwrap();
//! assert_eq!(mesh.num_vertices(), 3);
//! ```
//!
//! Primitives for testing and benchmarking live in [`creation`].

mod adjacency;
pub mod creation;
mod index;
mod trimesh;

pub use adjacency::{Adjacency, FacePair};
pub use index::{FaceId, MeshIndex, VertexId};
pub use trimesh::TriMesh;

pub(crate) use trimesh::{signed_volume, vertex_normals};
