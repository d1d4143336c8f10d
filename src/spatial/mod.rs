//! Spatial acceleration structures.
//!
//! [`SpatialIndex`] is a bounding volume hierarchy over the triangles of a
//! mesh. Meshes build one lazily the first time a query needs it; it can
//! also be built directly with [`SpatialIndex::build`].
//!
//! The generic [`SpatialIndex::traverse`] drives every query in the crate:
//! nearest-point search shrinks its bound as candidates improve, ray casts
//! clip the slab interval, and ball queries prune by box distance.
//!
//! # Example
//!
//! ```
//! use surfquery::mesh::creation::icosphere;
//!
//! let sphere = icosphere(2, 1.0);
//! let index = sphere.spatial_index().unwrap();
//! assert_eq!(index.num_faces(), sphere.num_faces());
//! assert!(index.bounds().max.x <= 1.0 + 1e-12);
//! ```

mod bvh;

pub use bvh::{
    BvhNode, IndexOptions, IndexStats, NodeId, NodeKind, SpatialIndex, SplitRule, MAX_DEPTH,
};
