//! Discrete curvature measures over ball neighbourhoods.
//!
//! Rather than a per-vertex curvature density, these estimators integrate
//! curvature over the part of the surface inside a Euclidean ball and then
//! divide by the area a unit sphere would expose to the same ball. On a unit
//! sphere both measures are therefore close to one for any radius.
//!
//! # Measures
//!
//! - **Gaussian**: sum of the angle defects `2π − Σθ` of the mesh vertices
//!   inside the ball
//! - **Mean**: `½ Σ |e ∩ B| · β_e · s_e` over interior edges, where `β_e` is
//!   the dihedral angle between the two face normals and `s_e` is +1 on
//!   convex edges and −1 on concave ones
//!
//! Ball lookups go through the mesh's spatial index; query points are
//! processed in parallel.
//!
//! # Example
//!
//! ```
//! use surfquery::algo::curvature::{curvature_measure, CurvatureKind};
//! use surfquery::mesh::creation::icosphere;
//! use nalgebra::Point3;
//!
//! let sphere = icosphere(3, 1.0);
//! let k = curvature_measure(&sphere, &[Point3::new(0.0, 0.0, 1.0)], 3.0, CurvatureKind::Gaussian)
//!     .unwrap();
//! assert!((k[0] - 1.0).abs() < 1e-9);
//! ```
//!
//! # References
//!
//! - Cohen-Steiner, D., Morvan, J.-M. (2003). "Restricted Delaunay
//!   Triangulations and Normal Cycle." Symposium on Computational Geometry.

use std::f64::consts::PI;

use nalgebra::Point3;
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::geometry::triangle::triangle_angles;
use crate::mesh::{FaceId, MeshIndex, TriMesh, VertexId};
use crate::spatial::SpatialIndex;

/// Which curvature measure to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurvatureKind {
    /// Integrated angle defect.
    Gaussian,
    /// Integrated dihedral angle along edges.
    Mean,
}

/// Area of a sphere of radius `sphere_radius` inside a ball of radius
/// `ball_radius` centred on the sphere's surface.
///
/// Saturates at the full sphere area `4πR²` once the ball swallows the sphere.
pub fn sphere_ball_intersection(sphere_radius: f64, ball_radius: f64) -> f64 {
    let r = sphere_radius;
    let x = (2.0 * r * r - ball_radius * ball_radius) / (2.0 * r);
    if x >= -r {
        2.0 * PI * r * (r - x)
    } else {
        4.0 * PI * r * r
    }
}

/// Length of the part of segment `[start, end]` inside a ball.
pub fn line_ball_intersection(
    start: &Point3<f64>,
    end: &Point3<f64>,
    center: &Point3<f64>,
    radius: f64,
) -> f64 {
    let l = end - start;
    let oc = start - center;
    let a = l.norm_squared();
    if a == 0.0 {
        return 0.0;
    }

    let b = l.dot(&oc);
    let disc = b * b - a * (oc.norm_squared() - radius * radius);
    if disc <= 0.0 {
        return 0.0;
    }

    let sq = disc.sqrt();
    let d1 = ((-b - sq) / a).clamp(0.0, 1.0);
    let d2 = ((-b + sq) / a).clamp(0.0, 1.0);
    (d2 - d1) * a.sqrt()
}

/// Angle defect `2π − Σθ` of every vertex.
///
/// Vertices not referenced by any triangle have no incident angles and get
/// a defect of `2π`; the curvature measures skip them.
pub fn vertex_defects<I: MeshIndex>(mesh: &TriMesh<I>) -> Vec<f64> {
    let mut angle_sums = vec![0.0; mesh.num_vertices()];
    for f in mesh.face_ids() {
        let [a, b, c] = mesh.face_positions(f);
        let angles = triangle_angles(&a, &b, &c);
        for (v, angle) in mesh.face_triangle(f).into_iter().zip(angles) {
            angle_sums[v.index()] += angle;
        }
    }
    angle_sums.into_iter().map(|sum| 2.0 * PI - sum).collect()
}

/// Signed dihedral weight `β_e · s_e` of every face pair of the mesh
/// adjacency, in the same order.
fn edge_weights<I: MeshIndex>(mesh: &TriMesh<I>) -> Vec<f64> {
    mesh.adjacency()
        .face_pairs()
        .iter()
        .map(|pair| {
            let n0 = mesh.face_normal(pair.faces[0]);
            let n1 = mesh.face_normal(pair.faces[1]);
            if n0.norm_squared() == 0.0 || n1.norm_squared() == 0.0 {
                return 0.0;
            }
            let angle = n0.dot(&n1).clamp(-1.0, 1.0).acos();

            // Convex when the far vertex of the second face lies below the first face
            let origin = mesh.position(pair.edge[0]);
            let other = mesh.position(pair.unshared[1]);
            let convex = n0.dot(&(other - origin)) <= 0.0;
            if convex {
                angle
            } else {
                -angle
            }
        })
        .collect()
}

/// Unnormalised Gaussian curvature measure at each point.
///
/// # Errors
///
/// [`MeshError::InvalidRadius`] for a non-positive or non-finite radius and
/// [`MeshError::EmptyMesh`] for a mesh without triangles.
pub fn discrete_gaussian_curvature_measure<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
) -> Result<Vec<f64>> {
    measure_impl(mesh, points, radius, CurvatureKind::Gaussian, true)
}

/// Unnormalised mean curvature measure at each point.
///
/// # Errors
///
/// Same as [`discrete_gaussian_curvature_measure`].
pub fn discrete_mean_curvature_measure<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
) -> Result<Vec<f64>> {
    measure_impl(mesh, points, radius, CurvatureKind::Mean, true)
}

/// Curvature measure at each point, normalised by
/// [`sphere_ball_intersection`]`(1, radius)`.
///
/// This function uses parallel computation. Use
/// [`curvature_measure_sequential`] for single-threaded execution.
pub fn curvature_measure<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
    kind: CurvatureKind,
) -> Result<Vec<f64>> {
    normalized_impl(mesh, points, radius, kind, true)
}

/// Sequential version of [`curvature_measure`].
pub fn curvature_measure_sequential<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
    kind: CurvatureKind,
) -> Result<Vec<f64>> {
    normalized_impl(mesh, points, radius, kind, false)
}

/// Normalised curvature measure centred on mesh vertices.
///
/// # Errors
///
/// [`MeshError::InvalidParameter`] if a vertex id is out of range, plus the
/// errors of [`curvature_measure`].
pub fn curvature_at_vertices<I: MeshIndex>(
    mesh: &TriMesh<I>,
    vertices: &[VertexId<I>],
    radius: f64,
    kind: CurvatureKind,
) -> Result<Vec<f64>> {
    if let Some(v) = vertices.iter().find(|v| v.index() >= mesh.num_vertices()) {
        return Err(MeshError::invalid_param(
            "vertices",
            v.index(),
            "vertex index out of range",
        ));
    }
    let points: Vec<Point3<f64>> = vertices.iter().map(|&v| *mesh.position(v)).collect();
    curvature_measure(mesh, &points, radius, kind)
}

fn normalized_impl<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
    kind: CurvatureKind,
    parallel: bool,
) -> Result<Vec<f64>> {
    let mut values = measure_impl(mesh, points, radius, kind, parallel)?;
    let norm = sphere_ball_intersection(1.0, radius);
    for value in &mut values {
        *value /= norm;
    }
    Ok(values)
}

fn measure_impl<I: MeshIndex>(
    mesh: &TriMesh<I>,
    points: &[Point3<f64>],
    radius: f64,
    kind: CurvatureKind,
    parallel: bool,
) -> Result<Vec<f64>> {
    if !(radius > 0.0 && radius.is_finite()) {
        return Err(MeshError::InvalidRadius { radius });
    }
    if let Some(i) = points.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
        return Err(MeshError::invalid_param(
            "points",
            i,
            "query point has a non-finite coordinate",
        ));
    }
    let index = mesh.spatial_index()?;

    let values: Vec<f64> = match kind {
        CurvatureKind::Gaussian => {
            let defects = vertex_defects(mesh);
            let compute = |p: &Point3<f64>| gaussian_in_ball(mesh, index, &defects, p, radius);
            if parallel {
                points.par_iter().map(compute).collect()
            } else {
                points.iter().map(compute).collect()
            }
        }
        CurvatureKind::Mean => {
            let weights = edge_weights(mesh);
            let compute = |p: &Point3<f64>| mean_in_ball(mesh, index, &weights, p, radius);
            if parallel {
                points.par_iter().map(compute).collect()
            } else {
                points.iter().map(compute).collect()
            }
        }
    };

    log::debug!(
        "{:?} curvature measure at {} points, radius {}",
        kind,
        points.len(),
        radius
    );
    Ok(values)
}

/// Faces whose bounding boxes touch the ball.
fn faces_near_ball<I: MeshIndex>(
    index: &SpatialIndex<I>,
    center: &Point3<f64>,
    radius: f64,
) -> Vec<FaceId<I>> {
    let r2 = radius * radius;
    let mut found = Vec::new();
    index.traverse(
        &mut found,
        |_, bbox| {
            let d2 = bbox.squared_distance_to_point(center);
            (d2 <= r2).then_some(d2)
        },
        |found, faces| found.extend_from_slice(faces),
    );
    found
}

fn gaussian_in_ball<I: MeshIndex>(
    mesh: &TriMesh<I>,
    index: &SpatialIndex<I>,
    defects: &[f64],
    center: &Point3<f64>,
    radius: f64,
) -> f64 {
    let r2 = radius * radius;
    let mut inside: Vec<VertexId<I>> = faces_near_ball(index, center, radius)
        .into_iter()
        .flat_map(|f| mesh.face_triangle(f))
        .filter(|&v| (mesh.position(v) - center).norm_squared() <= r2)
        .collect();
    inside.sort_unstable();
    inside.dedup();
    inside.iter().map(|v| defects[v.index()]).sum()
}

fn mean_in_ball<I: MeshIndex>(
    mesh: &TriMesh<I>,
    index: &SpatialIndex<I>,
    weights: &[f64],
    center: &Point3<f64>,
    radius: f64,
) -> f64 {
    let adjacency = mesh.adjacency();
    let mut pairs: Vec<usize> = faces_near_ball(index, center, radius)
        .into_iter()
        .flat_map(|f| adjacency.pairs_of_face(f).iter().copied())
        .collect();
    pairs.sort_unstable();
    pairs.dedup();

    let face_pairs = adjacency.face_pairs();
    pairs
        .into_iter()
        .map(|pi| {
            let [a, b] = face_pairs[pi].edge;
            let length = line_ball_intersection(mesh.position(a), mesh.position(b), center, radius);
            length * weights[pi]
        })
        .sum::<f64>()
        / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::creation::{cuboid, grid, icosphere};
    use nalgebra::Vector3;

    #[test]
    fn test_sphere_ball_intersection() {
        // Half the sphere is inside a ball of radius sqrt(2) centred on it
        let half = sphere_ball_intersection(1.0, 2.0_f64.sqrt());
        assert!((half - 2.0 * PI).abs() < 1e-12);

        // Swallowed sphere saturates
        assert!((sphere_ball_intersection(1.0, 2.0) - 4.0 * PI).abs() < 1e-12);
        assert!((sphere_ball_intersection(1.0, 100.0) - 4.0 * PI).abs() < 1e-12);
        assert!((sphere_ball_intersection(2.0, 1e6) - 16.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_line_ball_intersection() {
        let c = Point3::origin();
        let a = Point3::new(-2.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        assert!((line_ball_intersection(&a, &b, &c, 1.0) - 2.0).abs() < 1e-12);

        // Clipped to the segment
        let mid = Point3::new(0.5, 0.0, 0.0);
        assert!((line_ball_intersection(&a, &mid, &c, 1.0) - 1.5).abs() < 1e-12);

        // Missing and degenerate segments
        let off = Point3::new(-2.0, 3.0, 0.0);
        let off2 = Point3::new(2.0, 3.0, 0.0);
        assert_eq!(line_ball_intersection(&off, &off2, &c, 1.0), 0.0);
        assert_eq!(line_ball_intersection(&a, &a, &c, 5.0), 0.0);
    }

    #[test]
    fn test_vertex_defects_gauss_bonnet() {
        let mesh = icosphere(2, 1.0);
        let total: f64 = vertex_defects(&mesh).iter().sum();
        assert!((total - 4.0 * PI).abs() < 1e-9);

        let cube = cuboid(Vector3::new(1.0, 1.0, 1.0));
        for defect in vertex_defects(&cube) {
            assert!((defect - PI / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_large_radius_on_unit_sphere() {
        let mesh = icosphere(3, 1.0);
        let points = [Point3::new(0.0, 0.0, 1.0), Point3::new(0.6, 0.0, 0.8)];

        let gaussian = curvature_measure(&mesh, &points, 2.5, CurvatureKind::Gaussian).unwrap();
        for k in gaussian {
            assert!((k - 1.0).abs() < 1e-9, "Gaussian measure {}", k);
        }

        let mean = curvature_measure(&mesh, &points, 2.5, CurvatureKind::Mean).unwrap();
        for h in mean {
            assert!((h - 1.0).abs() < 0.05, "mean measure {}", h);
        }
    }

    #[test]
    fn test_huge_radius_does_not_overflow() {
        let mesh = icosphere(3, 1.0);
        let points = [Point3::new(0.0, 0.0, 1.0), Point3::new(0.0, -0.8, 0.6)];
        for radius in [1e200, 1e300, f64::MAX] {
            let gaussian = curvature_measure(&mesh, &points, radius, CurvatureKind::Gaussian).unwrap();
            let mean = curvature_measure(&mesh, &points, radius, CurvatureKind::Mean).unwrap();
            for (k, h) in gaussian.into_iter().zip(mean) {
                assert!((k - 1.0).abs() < 1e-9, "Gaussian measure {} at radius {}", k, radius);
                assert!((h - 1.0).abs() < 0.05, "mean measure {} at radius {}", h, radius);
            }
        }
    }

    #[test]
    fn test_small_radius_on_unit_sphere() {
        let mesh = icosphere(4, 1.0);
        let vertices: Vec<VertexId> = mesh.vertex_ids().collect();

        for kind in [CurvatureKind::Gaussian, CurvatureKind::Mean] {
            let values = curvature_at_vertices(&mesh, &vertices, 0.5, kind).unwrap();
            for &k in &values {
                assert!((k - 1.0).abs() < 0.35, "{:?} measure {}", kind, k);
            }
            let average = values.iter().sum::<f64>() / values.len() as f64;
            assert!((average - 1.0).abs() < 0.05, "{:?} average {}", kind, average);
        }
    }

    #[test]
    fn test_scaled_sphere() {
        // Integrated Gaussian curvature is scale invariant; mean scales with size
        let mesh = icosphere(3, 2.0);
        let p = [Point3::new(0.0, 0.0, 2.0)];
        let k = discrete_gaussian_curvature_measure(&mesh, &p, 10.0).unwrap();
        assert!((k[0] - 4.0 * PI).abs() < 1e-9);
        let h = discrete_mean_curvature_measure(&mesh, &p, 10.0).unwrap();
        assert!((h[0] - 8.0 * PI).abs() < 0.05 * 8.0 * PI);
    }

    #[test]
    fn test_flat_grid_interior() {
        let mesh = grid(6, 1.0);
        let p = [Point3::new(3.0, 3.0, 0.0)];
        for kind in [CurvatureKind::Gaussian, CurvatureKind::Mean] {
            let value = curvature_measure(&mesh, &p, 1.5, kind).unwrap();
            assert!(value[0].abs() < 1e-9, "{:?} measure {}", kind, value[0]);
        }
    }

    #[test]
    fn test_concave_edges_are_negative() {
        // Flip the sphere inside out: every edge becomes concave
        let mesh = icosphere(2, 1.0);
        let flipped_faces: Vec<[usize; 3]> = mesh
            .faces_as_usize()
            .into_iter()
            .map(|[a, b, c]| [a, c, b])
            .collect();
        let flipped: TriMesh = TriMesh::new(mesh.vertices(), &flipped_faces).unwrap();

        let p = [Point3::new(0.0, 0.0, 1.0)];
        let h = curvature_measure(&mesh, &p, 0.5, CurvatureKind::Mean).unwrap();
        let h_flipped = curvature_measure(&flipped, &p, 0.5, CurvatureKind::Mean).unwrap();
        assert!(h[0] > 0.0);
        assert!((h[0] + h_flipped[0]).abs() < 1e-12);
    }

    #[test]
    fn test_ball_far_from_mesh() {
        let mesh = icosphere(2, 1.0);
        let p = [Point3::new(10.0, 0.0, 0.0)];
        let k = curvature_measure(&mesh, &p, 1.0, CurvatureKind::Gaussian).unwrap();
        assert_eq!(k[0], 0.0);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mesh = icosphere(3, 1.0);
        let points: Vec<_> = mesh.vertices()[..40].to_vec();
        for kind in [CurvatureKind::Gaussian, CurvatureKind::Mean] {
            let par = curvature_measure(&mesh, &points, 0.4, kind).unwrap();
            let seq = curvature_measure_sequential(&mesh, &points, 0.4, kind).unwrap();
            assert_eq!(par, seq);
        }
    }

    #[test]
    fn test_invalid_radius() {
        let mesh = icosphere(1, 1.0);
        let p = [Point3::origin()];
        for radius in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = curvature_measure(&mesh, &p, radius, CurvatureKind::Mean).unwrap_err();
            assert!(matches!(err, MeshError::InvalidRadius { .. }));
        }
    }

    #[test]
    fn test_out_of_range_vertex() {
        let mesh = icosphere(1, 1.0);
        let err = curvature_at_vertices(&mesh, &[VertexId::new(10_000)], 1.0, CurvatureKind::Gaussian)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "vertices", .. }));
    }
}
