//! Vertex and face connectivity derived from the triangle list.
//!
//! Built once per mesh and cached by [`TriMesh::adjacency`](super::TriMesh::adjacency).
//! Everything is stored in flat, offset-indexed arrays:
//!
//! - vertex to neighbouring vertices (through an edge)
//! - vertex to incident faces
//! - face adjacency: pairs of faces sharing an edge, with the shared edge and
//!   the vertex of each face not on that edge
//! - face to the pairs it takes part in
//!
//! Non-manifold edges shared by more than two faces produce one pair for each
//! consecutive pair of faces in ascending face order. Repeated indices inside
//! a face do not produce edges.

use super::index::{FaceId, MeshIndex, VertexId};

/// Two faces sharing an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacePair<I: MeshIndex = u32> {
    /// The two faces, lower index first.
    pub faces: [FaceId<I>; 2],
    /// The shared edge, lower vertex index first.
    pub edge: [VertexId<I>; 2],
    /// For each face, its vertex not on the shared edge.
    pub unshared: [VertexId<I>; 2],
}

/// Cached mesh connectivity.
#[derive(Debug, Clone)]
pub struct Adjacency<I: MeshIndex = u32> {
    neighbor_offsets: Vec<usize>,
    neighbors: Vec<VertexId<I>>,
    face_offsets: Vec<usize>,
    vertex_faces: Vec<FaceId<I>>,
    pairs: Vec<FacePair<I>>,
    pair_offsets: Vec<usize>,
    face_pairs: Vec<usize>,
}

impl<I: MeshIndex> Adjacency<I> {
    /// Build connectivity for `num_vertices` vertices and the given triangles.
    pub fn build(num_vertices: usize, faces: &[[VertexId<I>; 3]]) -> Self {
        let mut vertex_edges = Vec::with_capacity(faces.len() * 6);
        let mut vertex_faces = Vec::with_capacity(faces.len() * 3);
        // ((lo, hi), face, unshared vertex)
        let mut edges = Vec::with_capacity(faces.len() * 3);

        for (fi, face) in faces.iter().enumerate() {
            let f = FaceId::<I>::new(fi);
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let c = face[(i + 2) % 3];
                vertex_faces.push((a.index(), f));
                if a == b {
                    continue;
                }
                vertex_edges.push((a.index(), b));
                vertex_edges.push((b.index(), a));
                edges.push(((a.min(b), a.max(b)), f, c));
            }
        }

        vertex_edges.sort_unstable();
        vertex_edges.dedup();
        vertex_faces.sort_unstable();
        vertex_faces.dedup();
        let (neighbor_offsets, neighbors) = to_csr(num_vertices, vertex_edges);
        let (face_offsets, vertex_faces) = to_csr(num_vertices, vertex_faces);

        edges.sort_unstable_by_key(|&(key, f, _)| (key, f));
        edges.dedup_by_key(|&mut (key, f, _)| (key, f));

        let mut pairs = Vec::new();
        for window in edges.windows(2) {
            let (key_a, fa, ua) = window[0];
            let (key_b, fb, ub) = window[1];
            if key_a == key_b {
                pairs.push(FacePair {
                    faces: [fa, fb],
                    edge: [key_a.0, key_a.1],
                    unshared: [ua, ub],
                });
            }
        }

        let mut by_face: Vec<(usize, usize)> = pairs
            .iter()
            .enumerate()
            .flat_map(|(pi, pair)| pair.faces.map(|f| (f.index(), pi)))
            .collect();
        by_face.sort_unstable();
        let (pair_offsets, face_pairs) = to_csr(faces.len(), by_face);

        Self {
            neighbor_offsets,
            neighbors,
            face_offsets,
            vertex_faces,
            pairs,
            pair_offsets,
            face_pairs,
        }
    }

    /// Number of vertices covered.
    pub fn num_vertices(&self) -> usize {
        self.neighbor_offsets.len() - 1
    }

    /// Vertices connected to `v` by an edge, in ascending order.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> &[VertexId<I>] {
        let i = v.index();
        &self.neighbors[self.neighbor_offsets[i]..self.neighbor_offsets[i + 1]]
    }

    /// Faces referencing `v`, in ascending order.
    pub fn vertex_faces(&self, v: VertexId<I>) -> &[FaceId<I>] {
        let i = v.index();
        &self.vertex_faces[self.face_offsets[i]..self.face_offsets[i + 1]]
    }

    /// Whether any face references `v`.
    pub fn is_referenced(&self, v: VertexId<I>) -> bool {
        !self.vertex_faces(v).is_empty()
    }

    /// All pairs of faces sharing an edge, ordered by edge.
    pub fn face_pairs(&self) -> &[FacePair<I>] {
        &self.pairs
    }

    /// Positions in [`face_pairs`](Self::face_pairs) of the pairs containing `f`.
    pub fn pairs_of_face(&self, f: FaceId<I>) -> &[usize] {
        let i = f.index();
        &self.face_pairs[self.pair_offsets[i]..self.pair_offsets[i + 1]]
    }
}

fn to_csr<T>(n: usize, sorted: Vec<(usize, T)>) -> (Vec<usize>, Vec<T>) {
    let mut offsets = vec![0usize; n + 1];
    for &(row, _) in &sorted {
        offsets[row + 1] += 1;
    }
    for i in 0..n {
        offsets[i + 1] += offsets[i];
    }
    let values = sorted.into_iter().map(|(_, value)| value).collect();
    (offsets, values)
}
