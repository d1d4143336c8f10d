//! Procedural meshes.
//!
//! Small primitives used by the command-line tool, benchmarks and tests. All
//! closed primitives are wound counter-clockwise seen from outside.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use super::index::VertexId;
use super::trimesh::TriMesh;

/// Create a geodesic sphere centred at the origin.
///
/// Starts from a regular icosahedron and splits every triangle into four
/// `subdivisions` times, projecting new vertices onto the sphere. The result
/// has `20 * 4^subdivisions` faces.
///
/// # Example
///
/// ```
/// use surfquery::mesh::creation::icosphere;
///
/// let sphere = icosphere(2, 1.0);
/// assert_eq!(sphere.num_faces(), 320);
/// ```
pub fn icosphere(subdivisions: usize, radius: f64) -> TriMesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let scale = 1.0 / (1.0 + phi * phi).sqrt();

    let mut vertices: Vec<Vector3<f64>> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Vector3::new(x, y, z) * scale)
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut new_faces = Vec::with_capacity(faces.len() * 4);
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();

        for face in &faces {
            let mut mids = [0usize; 3];
            for i in 0..3 {
                let v0 = face[i];
                let v1 = face[(i + 1) % 3];
                let key = (v0.min(v1), v0.max(v1));
                mids[i] = *midpoints.entry(key).or_insert_with(|| {
                    vertices.push(((vertices[v0] + vertices[v1]) / 2.0).normalize());
                    vertices.len() - 1
                });
            }

            new_faces.push([face[0], mids[0], mids[2]]);
            new_faces.push([face[1], mids[1], mids[0]]);
            new_faces.push([face[2], mids[2], mids[1]]);
            new_faces.push([mids[0], mids[1], mids[2]]);
        }

        faces = new_faces;
    }

    let positions = vertices
        .into_iter()
        .map(|v| Point3::from(v * radius))
        .collect();
    TriMesh::from_parts(positions, to_ids(&faces))
}

/// Create an axis-aligned box centred at the origin with the given edge lengths.
pub fn cuboid(extents: Vector3<f64>) -> TriMesh {
    let h = extents / 2.0;
    let positions = vec![
        Point3::new(-h.x, -h.y, -h.z),
        Point3::new(h.x, -h.y, -h.z),
        Point3::new(h.x, h.y, -h.z),
        Point3::new(-h.x, h.y, -h.z),
        Point3::new(-h.x, -h.y, h.z),
        Point3::new(h.x, -h.y, h.z),
        Point3::new(h.x, h.y, h.z),
        Point3::new(-h.x, h.y, h.z),
    ];
    let faces = [
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ];
    TriMesh::from_parts(positions, to_ids(&faces))
}

/// Create a flat `n` x `n` grid of quads in the z = 0 plane, two triangles each.
///
/// Vertex `(i, j)` sits at `(i * spacing, j * spacing, 0)` and has index
/// `j * (n + 1) + i`. Normals point along +z.
pub fn grid(n: usize, spacing: f64) -> TriMesh {
    let mut positions = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            positions.push(Point3::new(i as f64 * spacing, j as f64 * spacing, 0.0));
        }
    }

    let mut faces = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + n + 1;
            let v11 = v01 + 1;
            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    TriMesh::from_parts(positions, to_ids(&faces))
}

fn to_ids(faces: &[[usize; 3]]) -> Vec<[VertexId; 3]> {
    faces.iter().map(|f| f.map(VertexId::new)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FaceId;
    use std::f64::consts::PI;

    #[test]
    fn test_icosphere_counts_and_radius() {
        for (subdivisions, faces) in [(0, 20), (1, 80), (3, 1280)] {
            let mesh = icosphere(subdivisions, 2.0);
            assert_eq!(mesh.num_faces(), faces);
            // Euler characteristic of a sphere
            assert_eq!(mesh.num_vertices() + mesh.num_faces() - faces * 3 / 2, 2);
            for p in mesh.vertices() {
                assert!((p.coords.norm() - 2.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_icosphere_is_outward() {
        let mesh = icosphere(2, 1.0);
        for f in mesh.face_ids() {
            let [a, b, c] = mesh.face_positions(f);
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(mesh.face_normal(f).dot(&centroid) > 0.0);
        }
        let volume = mesh.volume();
        assert!(volume > 0.0 && volume < 4.0 / 3.0 * PI);
    }

    #[test]
    fn test_cuboid_is_outward() {
        let mesh = cuboid(Vector3::new(1.0, 2.0, 3.0));
        assert!((mesh.volume() - 6.0).abs() < 1e-12);
        for f in mesh.face_ids() {
            let [a, b, c] = mesh.face_positions(f);
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(mesh.face_normal(f).dot(&centroid) > 0.0);
        }
    }

    #[test]
    fn test_grid_layout() {
        let mesh = grid(3, 0.5);
        assert_eq!(mesh.num_vertices(), 16);
        assert_eq!(mesh.num_faces(), 18);
        assert_eq!(mesh.position(VertexId::new(5)), &Point3::new(0.5, 0.5, 0.0));
        assert!((mesh.area() - 2.25).abs() < 1e-12);
        assert!((mesh.face_normal(FaceId::new(0)) - Vector3::z()).norm() < 1e-12);
    }
}
