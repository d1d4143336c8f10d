//! Random point sampling on mesh surfaces and in boxes.
//!
//! Sampling takes any [`Rng`]; the `_seeded` variants build a
//! [`StdRng`] from a seed so results are reproducible.
//!
//! # Example
//!
//! ```
//! use surfquery::algo::sample::sample_surface_seeded;
//! use surfquery::mesh::creation::icosphere;
//!
//! let mesh = icosphere(2, 1.0);
//! let (points, faces) = sample_surface_seeded(&mesh, 100, 7).unwrap();
//! assert_eq!(points.len(), 100);
//! assert_eq!(faces.len(), 100);
//! ```

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MeshError, Result};
use crate::geometry::Aabb;
use crate::mesh::{FaceId, MeshIndex, TriMesh};

/// Sample points uniformly by area on the surface of a mesh.
///
/// Faces are picked with probability proportional to their area, then a
/// point is drawn uniformly inside the triangle by folding a unit-square
/// sample back into the lower triangle.
///
/// Returns the points and the face each one lies on.
///
/// # Errors
///
/// - [`MeshError::EmptyMesh`] if the mesh has no triangles
/// - [`MeshError::InvalidParameter`] if the total area is zero
pub fn sample_surface<I, R>(
    mesh: &TriMesh<I>,
    count: usize,
    rng: &mut R,
) -> Result<(Vec<Point3<f64>>, Vec<FaceId<I>>)>
where
    I: MeshIndex,
    R: Rng + ?Sized,
{
    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    let cumulative: Vec<f64> = mesh
        .face_ids()
        .scan(0.0, |total, f| {
            *total += mesh.face_area(f);
            Some(*total)
        })
        .collect();
    let total = cumulative.last().copied().unwrap_or(0.0);
    if !(total > 0.0 && total.is_finite()) {
        return Err(MeshError::invalid_param(
            "mesh",
            total,
            "surface area must be positive",
        ));
    }

    let mut points = Vec::with_capacity(count);
    let mut faces = Vec::with_capacity(count);
    for _ in 0..count {
        let target = rng.gen_range(0.0..total);
        // First face whose running area exceeds the target; zero-area faces
        // share their running total with the previous face and are skipped.
        let fi = cumulative
            .partition_point(|&c| c <= target)
            .min(cumulative.len() - 1);
        let face = FaceId::new(fi);

        let [a, b, c] = mesh.face_positions(face);
        let (mut u, mut v): (f64, f64) = (rng.gen(), rng.gen());
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        points.push(a + (b - a) * u + (c - a) * v);
        faces.push(face);
    }

    log::debug!("Sampled {} surface points over area {}", count, total);

    Ok((points, faces))
}

/// [`sample_surface`] with a [`StdRng`] seeded from `seed`.
pub fn sample_surface_seeded<I: MeshIndex>(
    mesh: &TriMesh<I>,
    count: usize,
    seed: u64,
) -> Result<(Vec<Point3<f64>>, Vec<FaceId<I>>)> {
    sample_surface(mesh, count, &mut StdRng::seed_from_u64(seed))
}

/// Sample points uniformly inside a box.
///
/// Axes with zero extent produce that coordinate exactly.
pub fn sample_volume<R: Rng + ?Sized>(bounds: &Aabb, count: usize, rng: &mut R) -> Vec<Point3<f64>> {
    let extent = bounds.extent();
    (0..count)
        .map(|_| {
            Point3::new(
                bounds.min.x + extent.x * rng.gen::<f64>(),
                bounds.min.y + extent.y * rng.gen::<f64>(),
                bounds.min.z + extent.z * rng.gen::<f64>(),
            )
        })
        .collect()
}

/// [`sample_volume`] with a [`StdRng`] seeded from `seed`.
pub fn sample_volume_seeded(bounds: &Aabb, count: usize, seed: u64) -> Vec<Point3<f64>> {
    sample_volume(bounds, count, &mut StdRng::seed_from_u64(seed))
}
