//! Face-vertex triangle mesh.
//!
//! [`TriMesh`] stores an ordered list of vertex positions and an ordered list
//! of triangles indexing into it. Topology is fixed after construction;
//! vertex positions may be replaced through `&mut` access, which drops the
//! cached spatial index so the next query rebuilds it.
//!
//! Neither manifoldness nor non-degenerate triangles are required: the query
//! engines handle triangles with repeated indices or zero area.

use std::sync::OnceLock;

use nalgebra::{Point3, Vector3};

use super::adjacency::Adjacency;
use super::index::{FaceId, MeshIndex, VertexId};
use crate::error::{MeshError, Result};
use crate::geometry::triangle::{triangle_area, triangle_normal};
use crate::geometry::Aabb;
use crate::spatial::{IndexOptions, SpatialIndex};

/// A triangle mesh with a lazily built spatial index.
#[derive(Debug, Clone)]
pub struct TriMesh<I: MeshIndex = u32> {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[VertexId<I>; 3]>,
    index_options: IndexOptions,
    index: OnceLock<SpatialIndex<I>>,
    adjacency: OnceLock<Adjacency<I>>,
}

impl<I: MeshIndex> Default for TriMesh<I> {
    fn default() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }
}

impl<I: MeshIndex> TriMesh<I> {
    /// Build a mesh from vertex positions and triangle index triples.
    ///
    /// A mesh without triangles is valid; queries against it report
    /// [`MeshError::EmptyMesh`].
    ///
    /// # Errors
    ///
    /// - [`MeshError::IndexOverflow`] if there are more vertices or faces than `I` can address
    /// - [`MeshError::NonFiniteVertex`] if a coordinate is NaN or infinite
    /// - [`MeshError::InvalidVertexIndex`] if a triangle index is out of range
    ///
    /// # Example
    ///
    /// ```
    /// use surfquery::mesh::TriMesh;
    /// use nalgebra::Point3;
    ///
    /// let vertices = vec![
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.5, 1.0, 0.0),
    /// ];
    /// let mesh: TriMesh = TriMesh::new(&vertices, &[[0, 1, 2]]).unwrap();
    /// assert_eq!(mesh.num_faces(), 1);
    /// ```
    pub fn new(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Self> {
        let capacity = I::capacity();
        for count in [vertices.len(), faces.len()] {
            if count > capacity {
                return Err(MeshError::IndexOverflow { count, max: capacity });
            }
        }

        check_finite(vertices)?;

        let mut ids = Vec::with_capacity(faces.len());
        for (fi, face) in faces.iter().enumerate() {
            for &vi in face {
                if vi >= vertices.len() {
                    return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
                }
            }
            ids.push(face.map(VertexId::new));
        }

        Ok(Self::from_parts(vertices.to_vec(), ids))
    }

    /// Assemble a mesh from already validated parts.
    pub(crate) fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<[VertexId<I>; 3]>) -> Self {
        Self {
            vertices,
            faces,
            index_options: IndexOptions::default(),
            index: OnceLock::new(),
            adjacency: OnceLock::new(),
        }
    }

    /// Use the given options the next time the spatial index is built.
    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.set_index_options(options);
        self
    }

    /// Change the spatial index options, dropping any index already built.
    pub fn set_index_options(&mut self, options: IndexOptions) {
        self.index_options = options;
        self.index = OnceLock::new();
    }

    /// Options used to build the spatial index.
    pub fn index_options(&self) -> &IndexOptions {
        &self.index_options
    }

    // ==================== Accessors ====================

    /// Get the number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Whether the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// All vertex positions.
    #[inline]
    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    /// All triangles.
    #[inline]
    pub fn faces(&self) -> &[[VertexId<I>; 3]] {
        &self.faces
    }

    /// Triangles as plain `usize` triples.
    pub fn faces_as_usize(&self) -> Vec<[usize; 3]> {
        self.faces.iter().map(|f| f.map(VertexId::index)).collect()
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertices[v.index()]
    }

    /// Get the three vertices of a face.
    #[inline]
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        self.faces[f.index()]
    }

    /// Get the positions of the three vertices of a face.
    #[inline]
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        self.face_triangle(f).map(|v| self.vertices[v.index()])
    }

    /// Iterate over all vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.vertices.len()).map(VertexId::new)
    }

    /// Iterate over all face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.faces.len()).map(FaceId::new)
    }

    // ==================== Geometry ====================

    /// Unit normal of a face, or zero for a degenerate face.
    pub fn face_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        let [a, b, c] = self.face_positions(f);
        triangle_normal(&a, &b, &c)
    }

    /// Unit normals of all faces.
    pub fn face_normals(&self) -> Vec<Vector3<f64>> {
        self.face_ids().map(|f| self.face_normal(f)).collect()
    }

    /// Compute the area of a face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        let [a, b, c] = self.face_positions(f);
        triangle_area(&a, &b, &c)
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume (divergence theorem over the triangles).
    ///
    /// Positive for closed meshes with outward, counter-clockwise winding.
    /// Meaningless for open meshes.
    pub fn volume(&self) -> f64 {
        signed_volume(&self.vertices, &self.faces)
    }

    /// Vertex normals as the normalised sum of incident unit face normals.
    ///
    /// Vertices without a non-degenerate incident face get a zero normal.
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        vertex_normals(&self.vertices, &self.faces)
    }

    /// Compute the bounding box of all vertices.
    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    // ==================== Mutation ====================

    /// Replace all vertex positions, keeping the topology.
    ///
    /// Drops the cached spatial index; the next query rebuilds it.
    ///
    /// # Errors
    ///
    /// [`MeshError::LengthMismatch`] if the vertex count changes and
    /// [`MeshError::NonFiniteVertex`] for NaN or infinite coordinates.
    pub fn set_vertices(&mut self, vertices: Vec<Point3<f64>>) -> Result<()> {
        if vertices.len() != self.vertices.len() {
            return Err(MeshError::LengthMismatch {
                expected: self.vertices.len(),
                actual: vertices.len(),
            });
        }
        check_finite(&vertices)?;
        self.vertices = vertices;
        self.index = OnceLock::new();
        Ok(())
    }

    // ==================== Derived structures ====================

    /// The spatial index over the triangles, built on first use.
    ///
    /// # Errors
    ///
    /// [`MeshError::EmptyMesh`] if the mesh has no triangles.
    pub fn spatial_index(&self) -> Result<&SpatialIndex<I>> {
        if self.faces.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        Ok(self.index.get_or_init(|| {
            SpatialIndex::build_validated(&self.vertices, &self.faces, &self.index_options)
        }))
    }

    /// Whether a spatial index is currently cached.
    pub fn has_spatial_index(&self) -> bool {
        self.index.get().is_some()
    }

    /// Vertex and face connectivity, built on first use.
    pub fn adjacency(&self) -> &Adjacency<I> {
        self.adjacency
            .get_or_init(|| Adjacency::build(self.vertices.len(), &self.faces))
    }
}

fn check_finite(vertices: &[Point3<f64>]) -> Result<()> {
    match vertices.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
        Some(vertex) => Err(MeshError::NonFiniteVertex { vertex }),
        None => Ok(()),
    }
}

/// Normalised sum of incident unit face normals for each vertex.
pub(crate) fn vertex_normals<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[VertexId<I>; 3]],
) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for face in faces {
        let [a, b, c] = face.map(|v| vertices[v.index()]);
        let n = triangle_normal(&a, &b, &c);
        for v in face {
            normals[v.index()] += n;
        }
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize(f64::MIN_POSITIVE).unwrap_or_else(Vector3::zeros))
        .collect()
}

/// Signed volume of a triangle soup given as positions plus index triples.
pub(crate) fn signed_volume<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[VertexId<I>; 3]],
) -> f64 {
    faces
        .iter()
        .map(|f| {
            let a = vertices[f[0].index()].coords;
            let b = vertices[f[1].index()].coords;
            let c = vertices[f[2].index()].coords;
            a.dot(&b.cross(&c))
        })
        .sum::<f64>()
        / 6.0
}
