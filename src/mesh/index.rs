//! Vertex and face ids.
//!
//! Every query result names triangles by [`FaceId`] and vertices by
//! [`VertexId`]: closest points, ray hits, sampled points and the spatial
//! index leaves all store them. Ids order like their raw values, which is
//! what tie-breaking between equally good faces or vertices relies on.
//!
//! The integer behind an id is chosen per mesh through [`MeshIndex`]. A
//! `TriMesh<u16>` stores half the index data of the default `u32` mesh and
//! rejects meshes it cannot address at construction.

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Integer storage behind [`VertexId`] and [`FaceId`].
///
/// Implemented for `u16`, `u32` and `u64`. The largest value is reserved as
/// the invalid id that unfinished searches report.
pub trait MeshIndex:
    Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + Debug + Send + Sync + 'static
{
    /// Largest id a mesh may use.
    const MAX: Self;

    /// Id reported when nothing was found.
    const INVALID: Self;

    /// Narrow a position in the vertex or face list.
    ///
    /// Debug builds panic on values above [`MeshIndex::MAX`]; mesh
    /// construction checks [`MeshIndex::capacity`] first.
    fn from_usize(v: usize) -> Self;

    /// Widen back to a list position.
    fn to_usize(self) -> usize;

    /// Number of distinct elements addressable with this index type.
    fn capacity() -> usize {
        Self::MAX.to_usize().saturating_add(1)
    }

    /// Whether this is a real id rather than [`MeshIndex::INVALID`].
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl MeshIndex for u16 {
    const MAX: Self = u16::MAX - 1;
    const INVALID: Self = u16::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u16", v);
        v as u16
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl MeshIndex for u32 {
    const MAX: Self = u32::MAX - 1;
    const INVALID: Self = u32::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v <= Self::MAX as usize, "index {} too large for u32", v);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl MeshIndex for u64 {
    const MAX: Self = u64::MAX - 1;
    const INVALID: Self = u64::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        v as u64
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Position of a vertex in [`TriMesh::vertices`](super::TriMesh::vertices).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId<I: MeshIndex = u32>(I);

/// Position of a triangle in [`TriMesh::faces`](super::TriMesh::faces).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId<I: MeshIndex = u32>(I);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl<I: MeshIndex> $name<I> {
            /// Id of the element at list position `index`.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(I::from_usize(index))
            }

            /// The id searches start from before anything is found.
            #[inline]
            pub fn invalid() -> Self {
                Self(I::INVALID)
            }

            /// List position of the element.
            #[inline]
            pub fn index(self) -> usize {
                self.0.to_usize()
            }

            /// Stored integer.
            #[inline]
            pub fn raw(self) -> I {
                self.0
            }

            /// Whether this names a real element.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0.is_valid()
            }
        }

        impl<I: MeshIndex> Debug for $name<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.index())
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl<I: MeshIndex> Default for $name<I> {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl<I: MeshIndex> From<usize> for $name<I> {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(FaceId, "F");
