//! Bounding volume hierarchy over mesh triangles.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; children are always
//! created after their parent, so the root is node 0. Leaves reference a
//! contiguous range of a permuted face list.
//!
//! Construction is deterministic: primitives are ordered by centroid along
//! the split axis with face index as tie-breaker, so the same input always
//! produces the same tree regardless of the `parallel` flag.
//!
//! # References
//!
//! - Wald, I. (2007). "On fast Construction of SAH-based Bounding Volume
//!   Hierarchies." IEEE Symposium on Interactive Ray Tracing.

use std::cmp::Ordering;

use nalgebra::Point3;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::error::{MeshError, Result};
use crate::geometry::Aabb;
use crate::mesh::{FaceId, MeshIndex, TriMesh, VertexId};

/// Depth at which nodes become leaves regardless of size.
pub const MAX_DEPTH: usize = 64;

/// Number of centroid buckets evaluated by the surface area heuristic.
const SAH_BUCKETS: usize = 12;

/// Relative cost of visiting a node compared to testing one triangle.
const SAH_TRAVERSAL_COST: f64 = 0.125;

/// Index of a node in a [`SpatialIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the node in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How internal nodes partition their triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitRule {
    /// Split at the median centroid along the longest centroid axis.
    #[default]
    Median,
    /// Binned surface area heuristic along the longest centroid axis,
    /// falling back to the median when no bucket boundary separates the
    /// triangles.
    SurfaceAreaHeuristic,
}

/// Options for building a [`SpatialIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Maximum number of triangles in a leaf (default: 4).
    pub max_leaf_size: usize,

    /// Partitioning rule for internal nodes (default: median).
    pub split: SplitRule,

    /// Compute triangle bounds in parallel (default: true).
    pub parallel: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            split: SplitRule::Median,
            parallel: true,
        }
    }
}

impl IndexOptions {
    /// Set the maximum leaf size. Values below one are treated as one.
    pub fn with_max_leaf_size(mut self, max_leaf_size: usize) -> Self {
        self.max_leaf_size = max_leaf_size;
        self
    }

    /// Set the split rule.
    pub fn with_split(mut self, split: SplitRule) -> Self {
        self.split = split;
        self
    }

    /// Disable parallel construction.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Contents of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A leaf holding `count` faces starting at `start` in the face order.
    Leaf {
        /// First position in the permuted face list.
        start: u32,
        /// Number of faces.
        count: u32,
    },
    /// An internal node with two children.
    Internal {
        /// First child.
        left: NodeId,
        /// Second child.
        right: NodeId,
    },
}

/// A node of the hierarchy.
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Box enclosing every triangle below this node.
    pub bbox: Aabb,
    /// Leaf range or children.
    pub kind: NodeKind,
}

impl BvhNode {
    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// Shape statistics of a built index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of internal nodes.
    pub internal_count: usize,
    /// Number of leaves.
    pub leaf_count: usize,
    /// Number of levels (a single leaf has depth 1).
    pub depth: usize,
    /// Largest number of faces in one leaf.
    pub max_leaf_size: usize,
}

/// Bounding volume hierarchy over the triangles of a mesh.
///
/// Immutable once built and safe to share between threads. Every face
/// index appears in exactly one leaf.
#[derive(Debug, Clone)]
pub struct SpatialIndex<I: MeshIndex = u32> {
    nodes: Vec<BvhNode>,
    faces: Vec<FaceId<I>>,
    options: IndexOptions,
    depth: usize,
}

struct Primitive<I: MeshIndex> {
    face: FaceId<I>,
    bbox: Aabb,
    centroid: Point3<f64>,
}

impl<I: MeshIndex> SpatialIndex<I> {
    /// Build an index over triangles given by positions and index triples.
    ///
    /// # Errors
    ///
    /// [`MeshError::EmptyMesh`] if there are no triangles and
    /// [`MeshError::InvalidVertexIndex`] if a triangle references a missing vertex.
    pub fn build(
        vertices: &[Point3<f64>],
        faces: &[[VertexId<I>; 3]],
        options: &IndexOptions,
    ) -> Result<Self> {
        if faces.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        for (fi, face) in faces.iter().enumerate() {
            for v in face {
                if v.index() >= vertices.len() {
                    return Err(MeshError::InvalidVertexIndex {
                        face: fi,
                        vertex: v.index(),
                    });
                }
            }
        }
        Ok(Self::build_validated(vertices, faces, options))
    }

    /// Build an index for a mesh without caching it.
    pub fn from_mesh(mesh: &TriMesh<I>, options: &IndexOptions) -> Result<Self> {
        Self::build(mesh.vertices(), mesh.faces(), options)
    }

    /// Build from a non-empty triangle list with in-range indices.
    pub(crate) fn build_validated(
        vertices: &[Point3<f64>],
        faces: &[[VertexId<I>; 3]],
        options: &IndexOptions,
    ) -> Self {
        let primitive = |(fi, face): (usize, &[VertexId<I>; 3])| {
            let [a, b, c] = face.map(|v| vertices[v.index()]);
            let bbox = Aabb::from_triangle(&a, &b, &c);
            Primitive {
                face: FaceId::new(fi),
                centroid: bbox.center(),
                bbox,
            }
        };
        let mut primitives: Vec<Primitive<I>> = if options.parallel {
            faces.par_iter().enumerate().map(primitive).collect()
        } else {
            faces.iter().enumerate().map(primitive).collect()
        };

        let mut builder = Builder {
            nodes: Vec::with_capacity(2 * faces.len() / options.max_leaf_size.max(1) + 1),
            max_leaf_size: options.max_leaf_size.max(1),
            split: options.split,
            depth: 0,
        };
        builder.build_node(&mut primitives, 0, 0);

        let index = Self {
            nodes: builder.nodes,
            faces: primitives.into_iter().map(|p| p.face).collect(),
            options: options.clone(),
            depth: builder.depth,
        };
        log::debug!(
            "built spatial index: {} faces, {} nodes, depth {}, {:?} split",
            index.faces.len(),
            index.nodes.len(),
            index.depth,
            index.options.split
        );
        index
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &BvhNode {
        &self.nodes[id.index()]
    }

    /// All nodes; the root comes first.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of indexed faces.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Number of levels in the tree.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Box enclosing every triangle.
    pub fn bounds(&self) -> &Aabb {
        &self.nodes[0].bbox
    }

    /// Options the index was built with.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Faces stored in a leaf; empty for internal nodes.
    pub fn leaf_faces(&self, id: NodeId) -> &[FaceId<I>] {
        match self.node(id).kind {
            NodeKind::Leaf { start, count } => {
                &self.faces[start as usize..(start + count) as usize]
            }
            NodeKind::Internal { .. } => &[],
        }
    }

    /// Iterate over leaves and their faces.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &[FaceId<I>])> + '_ {
        (0..self.nodes.len())
            .map(NodeId::new)
            .filter(|&id| self.node(id).is_leaf())
            .map(|id| (id, self.leaf_faces(id)))
    }

    /// Collect shape statistics.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            depth: self.depth,
            ..IndexStats::default()
        };
        for node in &self.nodes {
            match node.kind {
                NodeKind::Leaf { count, .. } => {
                    stats.leaf_count += 1;
                    stats.max_leaf_size = stats.max_leaf_size.max(count as usize);
                }
                NodeKind::Internal { .. } => stats.internal_count += 1,
            }
        }
        stats
    }

    /// Best-first depth traversal with caller-supplied pruning.
    ///
    /// `bound` maps a node box to an ordering key, or `None` to prune the
    /// node. Of two children, the one with the smaller key is visited first.
    /// The bound is evaluated again when a node is popped, so pruning sees
    /// any tightening `leaf` made to `state` in the meantime. `leaf` receives
    /// the faces of every leaf that survives.
    pub fn traverse<S, B, L>(&self, state: &mut S, mut bound: B, mut leaf: L)
    where
        B: FnMut(&S, &Aabb) -> Option<f64>,
        L: FnMut(&mut S, &[FaceId<I>]),
    {
        let mut stack: SmallVec<[NodeId; MAX_DEPTH]> = SmallVec::new();
        stack.push(self.root());

        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if bound(state, &node.bbox).is_none() {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    leaf(state, &self.faces[start as usize..(start + count) as usize]);
                }
                NodeKind::Internal { left, right } => {
                    let left_key = bound(state, &self.node(left).bbox);
                    let right_key = bound(state, &self.node(right).bbox);
                    match (left_key, right_key) {
                        (Some(l), Some(r)) => {
                            // Push the farther child first so the nearer one pops next
                            if l <= r {
                                stack.push(right);
                                stack.push(left);
                            } else {
                                stack.push(left);
                                stack.push(right);
                            }
                        }
                        (Some(_), None) => stack.push(left),
                        (None, Some(_)) => stack.push(right),
                        (None, None) => {}
                    }
                }
            }
        }
    }
}

struct Builder {
    nodes: Vec<BvhNode>,
    max_leaf_size: usize,
    split: SplitRule,
    depth: usize,
}

impl Builder {
    fn build_node<I: MeshIndex>(
        &mut self,
        primitives: &mut [Primitive<I>],
        start: usize,
        depth: usize,
    ) -> NodeId {
        let mut bbox = Aabb::empty();
        let mut centroid_bounds = Aabb::empty();
        for p in primitives.iter() {
            bbox.expand(&p.bbox);
            centroid_bounds.expand_point(&p.centroid);
        }

        self.depth = self.depth.max(depth + 1);
        let id = NodeId::new(self.nodes.len());
        let leaf = NodeKind::Leaf {
            start: start as u32,
            count: primitives.len() as u32,
        };
        self.nodes.push(BvhNode { bbox, kind: leaf });

        if primitives.len() <= self.max_leaf_size || depth + 1 >= MAX_DEPTH {
            return id;
        }

        let axis = centroid_bounds.longest_axis();
        let mid = match self.split {
            SplitRule::Median => median_split(primitives, axis),
            SplitRule::SurfaceAreaHeuristic => {
                sah_split(primitives, axis, &bbox, &centroid_bounds)
                    .unwrap_or_else(|| median_split(primitives, axis))
            }
        };

        let (lo, hi) = primitives.split_at_mut(mid);
        let left = self.build_node(lo, start, depth + 1);
        let right = self.build_node(hi, start + mid, depth + 1);
        self.nodes[id.index()].kind = NodeKind::Internal { left, right };
        id
    }
}

fn by_centroid<I: MeshIndex>(axis: usize) -> impl Fn(&Primitive<I>, &Primitive<I>) -> Ordering {
    move |a, b| {
        a.centroid[axis]
            .total_cmp(&b.centroid[axis])
            .then(a.face.cmp(&b.face))
    }
}

fn median_split<I: MeshIndex>(primitives: &mut [Primitive<I>], axis: usize) -> usize {
    primitives.sort_unstable_by(by_centroid(axis));
    primitives.len() / 2
}

/// Binned SAH split. Returns `None` when splitting is not cheaper than a
/// leaf or every centroid falls into one bucket.
fn sah_split<I: MeshIndex>(
    primitives: &mut [Primitive<I>],
    axis: usize,
    bbox: &Aabb,
    centroid_bounds: &Aabb,
) -> Option<usize> {
    let lo = centroid_bounds.min[axis];
    let extent = centroid_bounds.max[axis] - lo;
    let parent_area = bbox.surface_area();
    if extent <= 0.0 || parent_area <= 0.0 {
        return None;
    }

    let bucket_of = |p: &Primitive<I>| {
        let t = (p.centroid[axis] - lo) / extent;
        ((t * SAH_BUCKETS as f64) as usize).min(SAH_BUCKETS - 1)
    };

    let mut counts = [0usize; SAH_BUCKETS];
    let mut bounds = [Aabb::empty(); SAH_BUCKETS];
    for p in primitives.iter() {
        let b = bucket_of(p);
        counts[b] += 1;
        bounds[b].expand(&p.bbox);
    }

    // Sweep from the right to get the suffix areas
    let mut right_area = [0.0; SAH_BUCKETS];
    let mut right_count = [0usize; SAH_BUCKETS];
    let mut acc = Aabb::empty();
    let mut n = 0;
    for b in (1..SAH_BUCKETS).rev() {
        acc.expand(&bounds[b]);
        n += counts[b];
        right_area[b] = acc.surface_area();
        right_count[b] = n;
    }

    let mut best: Option<(usize, f64)> = None;
    let leaf_cost = primitives.len() as f64;
    let mut acc = Aabb::empty();
    let mut n = 0;
    for b in 0..SAH_BUCKETS - 1 {
        acc.expand(&bounds[b]);
        n += counts[b];
        let rn = right_count[b + 1];
        if n == 0 || rn == 0 {
            continue;
        }
        let cost = SAH_TRAVERSAL_COST
            + (n as f64 * acc.surface_area() + rn as f64 * right_area[b + 1]) / parent_area;
        if cost < leaf_cost && best.map_or(true, |(_, c)| cost < c) {
            best = Some((b, cost));
        }
    }

    let (split_bucket, _) = best?;
    primitives.sort_unstable_by(by_centroid(axis));
    let mid = primitives
        .iter()
        .take_while(|p| bucket_of(p) <= split_bucket)
        .count();
    (mid > 0 && mid < primitives.len()).then_some(mid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::triangle::closest_point_on_triangle;
    use crate::mesh::creation::{grid, icosphere};

    fn check_invariants<I: MeshIndex>(index: &SpatialIndex<I>, mesh: &TriMesh<I>) {
        // Every face appears exactly once across the leaves
        let mut seen = vec![0usize; mesh.num_faces()];
        for (id, faces) in index.leaves() {
            let bbox = index.node(id).bbox;
            for &f in faces {
                seen[f.index()] += 1;
                for p in mesh.face_positions(f) {
                    assert!(bbox.contains_point(&p));
                }
            }
        }
        assert!(seen.iter().all(|&n| n == 1));

        // Children are enclosed by their parents
        for node in index.nodes() {
            if let NodeKind::Internal { left, right } = node.kind {
                for child in [left, right] {
                    let c = index.node(child).bbox;
                    assert!(node.bbox.contains_point(&c.min));
                    assert!(node.bbox.contains_point(&c.max));
                }
            }
        }
    }

    #[test]
    fn test_single_triangle_is_one_leaf() {
        let mesh = grid(1, 1.0);
        let single: TriMesh = TriMesh::new(mesh.vertices(), &mesh.faces_as_usize()[..1]).unwrap();
        let index = single.spatial_index().unwrap();
        assert_eq!(index.num_nodes(), 1);
        assert_eq!(index.depth(), 1);
        assert!(index.node(index.root()).is_leaf());
        assert_eq!(index.leaf_faces(index.root()), &[FaceId::new(0)]);
    }

    #[test]
    fn test_median_build_invariants() {
        let mesh = icosphere(3, 1.0);
        let index = mesh.spatial_index().unwrap();
        assert_eq!(index.num_faces(), mesh.num_faces());
        check_invariants(index, &mesh);

        let stats = index.stats();
        assert_eq!(stats.internal_count + 1, stats.leaf_count);
        assert!(stats.max_leaf_size <= 4);
        assert!(stats.depth <= MAX_DEPTH);
    }

    #[test]
    fn test_sah_build_invariants() {
        let options = IndexOptions::default()
            .with_split(SplitRule::SurfaceAreaHeuristic)
            .with_max_leaf_size(2);
        let mesh = icosphere(2, 1.0).with_index_options(options);
        let index = mesh.spatial_index().unwrap();
        check_invariants(index, &mesh);
        assert!(index.stats().max_leaf_size <= 2);
    }

    #[test]
    fn test_split_rules_give_same_query_results() {
        let median = icosphere(4, 1.0);
        let sah = icosphere(4, 1.0)
            .with_index_options(IndexOptions::default().with_split(SplitRule::SurfaceAreaHeuristic));

        let points: Vec<Point3<f64>> = (0..600)
            .map(|i| {
                let a = i as f64 * 0.173;
                let r = 0.2 + (i % 7) as f64 * 0.3;
                Point3::new(r * a.cos(), r * a.sin(), (a * 0.37).sin() * 1.5)
            })
            .collect();
        assert_eq!(
            median.nearest().on_surface(&points).unwrap(),
            sah.nearest().on_surface(&points).unwrap()
        );

        let directions: Vec<_> = points
            .iter()
            .enumerate()
            .map(|(i, p)| nalgebra::Vector3::new(-p.y, p.x, 0.3 - (i % 5) as f64 * 0.2))
            .collect();
        assert_eq!(
            median.ray().intersects_location(&points, &directions).unwrap(),
            sah.ray().intersects_location(&points, &directions).unwrap()
        );
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let mesh = icosphere(3, 1.0);
        let par = SpatialIndex::from_mesh(&mesh, &IndexOptions::default()).unwrap();
        let seq = SpatialIndex::from_mesh(&mesh, &IndexOptions::default().sequential()).unwrap();
        assert_eq!(par.num_nodes(), seq.num_nodes());
        assert_eq!(par.faces, seq.faces);
        for (a, b) in par.nodes().iter().zip(seq.nodes()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.bbox, b.bbox);
        }
    }

    #[test]
    fn test_coincident_triangles_terminate() {
        // Identical triangles cannot be separated; the depth cap must stop recursion
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2]; 100];
        let mesh: TriMesh = TriMesh::new(&vertices, &faces).unwrap();
        let index = mesh.spatial_index().unwrap();
        check_invariants(index, &mesh);
        assert!(index.depth() <= MAX_DEPTH);
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let vertices = vec![Point3::origin()];
        let err = SpatialIndex::<u32>::build(&vertices, &[], &IndexOptions::default()).unwrap_err();
        assert_eq!(err, MeshError::EmptyMesh);

        let faces = [[VertexId::new(0), VertexId::new(0), VertexId::new(3)]];
        let err = SpatialIndex::<u32>::build(&vertices, &faces, &IndexOptions::default()).unwrap_err();
        assert_eq!(err, MeshError::InvalidVertexIndex { face: 0, vertex: 3 });
    }

    #[test]
    fn test_traverse_prunes_by_ball() {
        let mesh = grid(8, 1.0);
        let index = mesh.spatial_index().unwrap();
        let center = Point3::new(0.0, 0.0, 0.0);

        let mut found = Vec::new();
        index.traverse(
            &mut found,
            |_, bbox| bbox.intersects_ball(&center, 0.5).then_some(0.0),
            |found, faces| {
                for &f in faces {
                    let [a, b, c] = mesh.face_positions(f);
                    let q = closest_point_on_triangle(&center, &a, &b, &c);
                    if (q - center).norm() <= 0.5 {
                        found.push(f);
                    }
                }
            },
        );
        found.sort();

        // Only the two triangles of the corner quad touch the ball
        assert_eq!(found, vec![FaceId::new(0), FaceId::new(1)]);
    }
}
