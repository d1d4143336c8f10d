//! Closest-point queries against a mesh surface.
//!
//! For each query point the engine finds the closest point on any triangle,
//! its distance and the triangle it lies on. The search is branch-and-bound
//! over the mesh's [`SpatialIndex`](crate::spatial::SpatialIndex): a node is
//! skipped once the squared distance to its box exceeds the best candidate.
//!
//! When several triangles are equally close (a point above a shared edge or
//! vertex) the lowest face index wins, so results do not depend on how the
//! tree happens to be traversed.
//!
//! Distances stay finite for any finite query point, including ones far
//! enough away that their squared distance would overflow. At that range the
//! search runs from a nearer point in the same direction, so the reported
//! point is only as precise as the query's own coordinates.
//!
//! # Example
//!
//! ```
//! use surfquery::mesh::creation::icosphere;
//! use nalgebra::Point3;
//!
//! let sphere = icosphere(3, 1.0);
//! let hit = sphere.nearest().closest_point(&Point3::new(0.0, 0.0, 2.0)).unwrap();
//! assert!((hit.distance - 1.0).abs() < 1e-9);
//! ```
//!
//! # References
//!
//! - Ericson, C. (2004). "Real-Time Collision Detection", §5.1.5.

use nalgebra::Point3;
use rayon::prelude::*;

use super::ray::RayOptions;
use crate::error::{MeshError, Result};
use crate::geometry::triangle::closest_point_on_triangle;
use crate::geometry::Aabb;
use crate::mesh::{FaceId, MeshIndex, TriMesh, VertexId};
use crate::spatial::SpatialIndex;

/// Options for nearest-point queries.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestOptions {
    /// Process query points in parallel (default: true).
    pub parallel: bool,
}

impl Default for NearestOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl NearestOptions {
    /// Process query points one after another.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Closest point on the surface for a single query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint<I: MeshIndex = u32> {
    /// The closest point on the surface.
    pub point: Point3<f64>,
    /// Euclidean distance from the query point.
    pub distance: f64,
    /// Triangle containing `point`.
    pub face: FaceId<I>,
}

/// Closest points for a batch of queries, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestPoints<I: MeshIndex = u32> {
    /// Closest surface points.
    pub points: Vec<Point3<f64>>,
    /// Distances from the query points.
    pub distances: Vec<f64>,
    /// Triangles containing the closest points.
    pub faces: Vec<FaceId<I>>,
}

impl<I: MeshIndex> Default for ClosestPoints<I> {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            distances: Vec::new(),
            faces: Vec::new(),
        }
    }
}

impl<I: MeshIndex> ClosestPoints<I> {
    /// Number of results.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Result for the `i`-th query point.
    pub fn get(&self, i: usize) -> Option<SurfacePoint<I>> {
        Some(SurfacePoint {
            point: *self.points.get(i)?,
            distance: self.distances[i],
            face: self.faces[i],
        })
    }
}

impl<I: MeshIndex> FromIterator<SurfacePoint<I>> for ClosestPoints<I> {
    fn from_iter<T: IntoIterator<Item = SurfacePoint<I>>>(iter: T) -> Self {
        let mut out = Self::default();
        for sp in iter {
            out.points.push(sp.point);
            out.distances.push(sp.distance);
            out.faces.push(sp.face);
        }
        out
    }
}

/// Nearest-point queries against one mesh.
///
/// Obtained from [`TriMesh::nearest`].
#[derive(Debug, Clone)]
pub struct NearestQuery<'a, I: MeshIndex = u32> {
    mesh: &'a TriMesh<I>,
    options: NearestOptions,
}

impl<I: MeshIndex> TriMesh<I> {
    /// Nearest-point queries with default options.
    pub fn nearest(&self) -> NearestQuery<'_, I> {
        NearestQuery {
            mesh: self,
            options: NearestOptions::default(),
        }
    }
}

impl<'a, I: MeshIndex> NearestQuery<'a, I> {
    /// Replace the query options.
    pub fn with_options(mut self, options: NearestOptions) -> Self {
        self.options = options;
        self
    }

    /// Closest surface point for every query point.
    ///
    /// # Errors
    ///
    /// [`MeshError::EmptyMesh`] if the mesh has no triangles, even for an
    /// empty batch, and [`MeshError::InvalidParameter`] for a non-finite
    /// query point.
    pub fn on_surface(&self, points: &[Point3<f64>]) -> Result<ClosestPoints<I>> {
        let index = self.mesh.spatial_index()?;
        check_points(points)?;

        let query = |p: &Point3<f64>| closest_on_surface(self.mesh, index, p);
        let results = if self.options.parallel {
            points.par_iter().map(query).collect::<Vec<_>>()
        } else {
            points.iter().map(query).collect::<Vec<_>>()
        };
        Ok(results.into_iter().collect())
    }

    /// Closest surface point for a single query point.
    pub fn closest_point(&self, point: &Point3<f64>) -> Result<SurfacePoint<I>> {
        let index = self.mesh.spatial_index()?;
        check_points(std::slice::from_ref(point))?;
        Ok(closest_on_surface(self.mesh, index, point))
    }

    /// Nearest vertex for every query point.
    ///
    /// Only vertices referenced by a triangle are candidates. Ties resolve
    /// to the lowest vertex index.
    pub fn vertex(&self, points: &[Point3<f64>]) -> Result<(Vec<f64>, Vec<VertexId<I>>)> {
        let index = self.mesh.spatial_index()?;
        check_points(points)?;

        let query = |p: &Point3<f64>| closest_vertex(self.mesh, index, p);
        let results: Vec<(f64, VertexId<I>)> = if self.options.parallel {
            points.par_iter().map(query).collect()
        } else {
            points.iter().map(query).collect()
        };
        Ok(results.into_iter().unzip())
    }

    /// Signed distance to the surface: positive inside, negative outside.
    ///
    /// Inside-ness comes from [`RayQuery::contains_points`](super::RayQuery::contains_points)
    /// and is only meaningful for closed meshes.
    pub fn signed_distance(&self, points: &[Point3<f64>]) -> Result<Vec<f64>> {
        let closest = self.on_surface(points)?;
        let ray_options = RayOptions {
            parallel: self.options.parallel,
            ..RayOptions::default()
        };
        let inside = self.mesh.ray().with_options(ray_options).contains_points(points)?;

        Ok(closest
            .distances
            .iter()
            .zip(inside)
            .map(|(&d, inside)| if inside { d } else { -d })
            .collect())
    }
}

fn check_points(points: &[Point3<f64>]) -> Result<()> {
    match points.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
        Some(i) => Err(MeshError::invalid_param(
            "points",
            i,
            "query point has a non-finite coordinate",
        )),
        None => Ok(()),
    }
}

/// Offset from the mesh bounds centre beyond which queries are pulled in.
const PROXY_REACH: f64 = 1e150;

/// Coordinates a single query is evaluated in.
///
/// Squared distances overflow once a query lies about 1e154 away from the
/// mesh. Such a query is replaced by a proxy on the line towards the bounds
/// centre, `PROXY_REACH` away, and the mesh is shrunk only if it is itself
/// that large. Every other query stays in world coordinates.
#[derive(Debug, Clone, Copy)]
enum Frame {
    World,
    Far { origin: Point3<f64>, scale: f64 },
}

impl Frame {
    /// The frame for `p` and `p` expressed in it.
    fn for_query(bounds: &Aabb, p: &Point3<f64>) -> (Self, Point3<f64>) {
        let center = bounds.center();
        let offset = p - center;
        let size = bounds.extent().amax();
        let reach = offset.amax().max(size);
        if (reach * reach).is_finite() {
            return (Frame::World, *p);
        }

        let scale = (size / PROXY_REACH).max(1.0);
        let local = offset / scale;
        let local_reach = local.amax();
        let local = if local_reach > PROXY_REACH {
            local * (PROXY_REACH / local_reach)
        } else {
            local
        };
        (Frame::Far { origin: center, scale }, Point3::from(local))
    }

    fn to_local(&self, x: &Point3<f64>) -> Point3<f64> {
        match *self {
            Frame::World => *x,
            Frame::Far { origin, scale } => Point3::from((x - origin) / scale),
        }
    }

    fn to_local_box(&self, bbox: &Aabb) -> Aabb {
        match self {
            Frame::World => *bbox,
            Frame::Far { .. } => {
                Aabb::from_min_max(self.to_local(&bbox.min), self.to_local(&bbox.max))
            }
        }
    }

    fn to_world(&self, x: &Point3<f64>) -> Point3<f64> {
        match *self {
            Frame::World => *x,
            Frame::Far { origin, scale } => origin + x.coords * scale,
        }
    }

    /// World distance from `p` to `q`, given their squared local distance.
    fn distance(&self, p: &Point3<f64>, q: &Point3<f64>, local_dist2: f64) -> f64 {
        match self {
            Frame::World => local_dist2.sqrt(),
            Frame::Far { .. } => {
                let v = p - q;
                let m = v.amax();
                if m == 0.0 {
                    0.0
                } else {
                    m * (v / m).norm()
                }
            }
        }
    }
}

struct Best<I: MeshIndex> {
    dist2: f64,
    point: Point3<f64>,
    face: FaceId<I>,
}

fn closest_on_surface<I: MeshIndex>(
    mesh: &TriMesh<I>,
    index: &SpatialIndex<I>,
    p: &Point3<f64>,
) -> SurfacePoint<I> {
    let (frame, local) = Frame::for_query(index.bounds(), p);
    let mut best = Best {
        dist2: f64::INFINITY,
        point: local,
        face: FaceId::invalid(),
    };

    index.traverse(
        &mut best,
        |best, bbox| {
            let d2 = frame.to_local_box(bbox).squared_distance_to_point(&local);
            (d2 <= best.dist2).then_some(d2)
        },
        |best, faces| {
            for &f in faces {
                let [a, b, c] = mesh.face_positions(f).map(|v| frame.to_local(&v));
                let q = closest_point_on_triangle(&local, &a, &b, &c);
                let d2 = (local - q).norm_squared();
                if d2 < best.dist2 || (d2 == best.dist2 && f < best.face) {
                    *best = Best { dist2: d2, point: q, face: f };
                }
            }
        },
    );

    let point = frame.to_world(&best.point);
    SurfacePoint {
        point,
        distance: frame.distance(p, &point, best.dist2),
        face: best.face,
    }
}

fn closest_vertex<I: MeshIndex>(
    mesh: &TriMesh<I>,
    index: &SpatialIndex<I>,
    p: &Point3<f64>,
) -> (f64, VertexId<I>) {
    let (frame, local) = Frame::for_query(index.bounds(), p);
    let mut best = (f64::INFINITY, VertexId::<I>::invalid());

    index.traverse(
        &mut best,
        |best, bbox| {
            let d2 = frame.to_local_box(bbox).squared_distance_to_point(&local);
            (d2 <= best.0).then_some(d2)
        },
        |best, faces| {
            for &f in faces {
                for v in mesh.face_triangle(f) {
                    let d2 = (frame.to_local(mesh.position(v)) - local).norm_squared();
                    if d2 < best.0 || (d2 == best.0 && v < best.1) {
                        *best = (d2, v);
                    }
                }
            }
        },
    );

    let distance = if best.1.is_valid() {
        frame.distance(p, mesh.position(best.1), best.0)
    } else {
        f64::INFINITY
    };
    (distance, best.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::creation::{cuboid, grid, icosphere};
    use nalgebra::Vector3;
    use proptest::prelude::*;

    fn brute_force(mesh: &TriMesh, p: &Point3<f64>) -> f64 {
        mesh.face_ids()
            .map(|f| {
                let [a, b, c] = mesh.face_positions(f);
                (p - closest_point_on_triangle(p, &a, &b, &c)).norm()
            })
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_points_off_a_sphere() {
        let mesh = icosphere(3, 1.0);
        let points = vec![
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(0.1, -0.2, 0.05),
            Point3::new(-2.0, 2.0, 1.0),
        ];
        let result = mesh.nearest().on_surface(&points).unwrap();
        assert_eq!(result.len(), 3);

        for (i, p) in points.iter().enumerate() {
            let hit = result.get(i).unwrap();
            assert!((hit.distance - brute_force(&mesh, p)).abs() < 1e-12);
            assert!(((p - hit.point).norm() - hit.distance).abs() < 1e-12);

            // The reported point lies on the reported face
            let [a, b, c] = mesh.face_positions(hit.face);
            let on_face = closest_point_on_triangle(&hit.point, &a, &b, &c);
            assert!((on_face - hit.point).norm() < 1e-9);
        }
    }

    #[test]
    fn test_point_on_surface_has_zero_distance() {
        let mesh = grid(4, 1.0);
        let hit = mesh.nearest().closest_point(&Point3::new(1.3, 2.7, 0.0)).unwrap();
        assert!(hit.distance < 1e-12);
    }

    #[test]
    fn test_shared_vertex_resolves_to_lowest_face() {
        // The top of the cube's corner is touched by several faces at once
        let mesh = cuboid(Vector3::new(2.0, 2.0, 2.0));
        let p = Point3::new(3.0, 3.0, 3.0);
        let hit = mesh.nearest().closest_point(&p).unwrap();
        let touching: Vec<FaceId> = mesh
            .face_ids()
            .filter(|&f| {
                let [a, b, c] = mesh.face_positions(f);
                ((p - closest_point_on_triangle(&p, &a, &b, &c)).norm() - hit.distance).abs()
                    < 1e-12
            })
            .collect();
        assert!(touching.len() > 1);
        assert_eq!(hit.face, touching[0]);
        assert!((hit.point - Point3::new(1.0, 1.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_repeated_queries_are_identical() {
        let mesh = icosphere(2, 1.0);
        let points: Vec<_> = (0..50)
            .map(|i| {
                let t = i as f64 * 0.37;
                Point3::new(t.cos() * 1.5, t.sin() * 0.5, (t * 0.5).sin())
            })
            .collect();
        let first = mesh.nearest().on_surface(&points).unwrap();
        let second = mesh.nearest().on_surface(&points).unwrap();
        let sequential = mesh
            .nearest()
            .with_options(NearestOptions::default().sequential())
            .on_surface(&points)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first, sequential);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh: TriMesh = TriMesh::new(&[Point3::origin()], &[]).unwrap();
        assert_eq!(mesh.nearest().on_surface(&[]).unwrap_err(), MeshError::EmptyMesh);
        assert_eq!(
            mesh.nearest().closest_point(&Point3::origin()).unwrap_err(),
            MeshError::EmptyMesh
        );
    }

    #[test]
    fn test_non_finite_query_point() {
        let mesh = grid(1, 1.0);
        let err = mesh
            .nearest()
            .on_surface(&[Point3::origin(), Point3::new(f64::NAN, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "points", .. }));
    }

    #[test]
    fn test_nearest_vertex() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            // Unreferenced vertex right at the query point
            Point3::new(0.9, 0.9, 0.0),
        ];
        let mesh: TriMesh = TriMesh::new(&vertices, &[[0, 1, 2]]).unwrap();
        let (distances, ids) = mesh.nearest().vertex(&[Point3::new(0.9, 0.9, 0.0)]).unwrap();
        assert!(ids[0] == VertexId::new(1));
        assert!((distances[0] - (0.01f64 + 0.81).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_signed_distance_sign() {
        let mesh = icosphere(3, 1.0);
        let d = mesh
            .nearest()
            .signed_distance(&[Point3::new(0.1, 0.2, 0.0), Point3::new(0.0, 0.0, 2.0)])
            .unwrap();
        assert!(d[0] > 0.5);
        assert!((d[1] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_far_query_distance_is_finite() {
        let mesh = icosphere(2, 1.0);
        for x in [1e150, 1e155, 1e300] {
            let hit = mesh.nearest().closest_point(&Point3::new(x, 0.0, 0.0)).unwrap();
            assert!(hit.distance.is_finite());
            assert!(((hit.distance - x) / x).abs() < 1e-12, "distance {}", hit.distance);
            assert!(hit.point.coords.norm() <= 1.0 + 1e-9);
            assert!(hit.face.is_valid());

            let (distances, ids) = mesh.nearest().vertex(&[Point3::new(-x, 0.0, 0.0)]).unwrap();
            assert!(((distances[0] - x) / x).abs() < 1e-12);
            assert!(ids[0].is_valid());
        }
    }

    #[test]
    fn test_small_index_type() {
        let sphere = icosphere(2, 1.0);
        let mesh: TriMesh<u16> = TriMesh::new(sphere.vertices(), &sphere.faces_as_usize()).unwrap();
        assert!(ClosestPoints::<u16>::default().is_empty());

        let points = [Point3::new(0.0, 0.0, 2.0), Point3::new(0.3, -0.2, 0.1)];
        let small = mesh.nearest().on_surface(&points).unwrap();
        let wide = sphere.nearest().on_surface(&points).unwrap();
        assert_eq!(small.len(), 2);
        for i in 0..points.len() {
            assert_eq!(small.faces[i].index(), wide.faces[i].index());
            assert_eq!(small.distances[i], wide.distances[i]);
        }
    }

    fn soup_strategy() -> impl Strategy<Value = (Vec<Point3<f64>>, Vec<[usize; 3]>)> {
        let coord = -10.0f64..10.0;
        let point = (coord.clone(), coord.clone(), coord).prop_map(|(x, y, z)| Point3::new(x, y, z));
        prop::collection::vec(point, 3..24).prop_flat_map(|vertices| {
            let n = vertices.len();
            let face = prop::array::uniform3(0..n);
            (Just(vertices), prop::collection::vec(face, 1..32))
        })
    }

    proptest! {
        #[test]
        fn test_matches_brute_force(
            (vertices, faces) in soup_strategy(),
            qx in -15.0f64..15.0,
            qy in -15.0f64..15.0,
            qz in -15.0f64..15.0,
        ) {
            // Repeated indices in the generated faces give degenerate triangles
            let mesh: TriMesh = TriMesh::new(&vertices, &faces).unwrap();
            let p = Point3::new(qx, qy, qz);
            let hit = mesh.nearest().closest_point(&p).unwrap();
            prop_assert!((hit.distance - brute_force(&mesh, &p)).abs() < 1e-9);
            prop_assert!(hit.distance >= 0.0);
        }
    }
}
