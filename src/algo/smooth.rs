//! Mesh smoothing filters.
//!
//! All filters move vertices in place and keep the topology. They are driven
//! by a row-normalised Laplacian operator `L` (see [`laplacian_operator`]),
//! so `L x` is the weighted average of each vertex's neighbours.
//!
//! # Algorithms
//!
//! - [`filter_laplacian`]: Laplacian smoothing, explicit or implicit, with an
//!   optional volume constraint
//! - [`filter_humphrey`]: Laplacian step followed by a push back towards the
//!   original and previous positions (reduces shrinkage)
//! - [`filter_taubin`]: alternating shrink and dilate steps
//! - [`filter_mut_dif_laplacian`]: per-vertex diffusion rate that adapts to
//!   the local displacement along the normal
//!
//! Positions are written back through
//! [`TriMesh::set_vertices`](crate::mesh::TriMesh::set_vertices), so any
//! cached spatial index is dropped.
//!
//! # Example
//!
//! ```
//! use surfquery::algo::smooth::{filter_taubin, TaubinOptions};
//! use surfquery::mesh::creation::icosphere;
//!
//! let mut mesh = icosphere(2, 1.0);
//! filter_taubin(&mut mesh, &TaubinOptions::default().with_iterations(4), None).unwrap();
//! ```
//!
//! # References
//!
//! - Taubin, G. (1995). "A Signal Processing Approach to Fair Surface Design."
//! - Vollmer, J., Mencl, R., Müller, H. (1999). "Improved Laplacian Smoothing
//!   of Noisy Surface Meshes."
//! - Desbrun, M. et al. (1999). "Implicit Fairing of Irregular Meshes using
//!   Diffusion and Curvature Flow."

use std::borrow::Cow;

use nalgebra::{DVector, Point3, Vector3};

use crate::error::{MeshError, Result};
use crate::mesh::{signed_volume, vertex_normals, MeshIndex, TriMesh, VertexId};

use super::sparse::{gauss_seidel, CsrMatrix};

/// Sweeps allowed per coordinate for the implicit solve.
const IMPLICIT_MAX_SWEEPS: usize = 1000;

/// Relative residual accepted by the implicit solve.
const IMPLICIT_TOLERANCE: f64 = 1e-12;

/// How neighbours are weighted in the Laplacian operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaplacianWeighting {
    /// Every neighbour contributes equally.
    #[default]
    Equal,
    /// Neighbours are weighted by inverse edge length.
    Umbrella,
}

/// Build the row-normalised Laplacian averaging operator of a mesh.
///
/// Row `i` holds the weights of the neighbours of vertex `i` and sums to one.
/// Pinned vertices and vertices without neighbours get an identity row, so
/// every filter leaves them where they are.
///
/// # Errors
///
/// [`MeshError::InvalidParameter`] if a pinned vertex is out of range.
pub fn laplacian_operator<I: MeshIndex>(
    mesh: &TriMesh<I>,
    weighting: LaplacianWeighting,
    pinned: &[VertexId<I>],
) -> Result<CsrMatrix> {
    let n = mesh.num_vertices();
    let mut is_pinned = vec![false; n];
    for &v in pinned {
        if v.index() >= n {
            return Err(MeshError::invalid_param(
                "pinned",
                v.index(),
                "vertex out of range",
            ));
        }
        is_pinned[v.index()] = true;
    }

    let adjacency = mesh.adjacency();
    let mut triplets = Vec::with_capacity(n * 7);
    for v in mesh.vertex_ids() {
        let i = v.index();
        let neighbors = adjacency.vertex_neighbors(v);
        if is_pinned[i] || neighbors.is_empty() {
            triplets.push((i, i, 1.0));
            continue;
        }
        match weighting {
            LaplacianWeighting::Equal => {
                let w = 1.0 / neighbors.len() as f64;
                triplets.extend(neighbors.iter().map(|u| (i, u.index(), w)));
            }
            LaplacianWeighting::Umbrella => {
                let p = mesh.position(v);
                let weights: Vec<f64> = neighbors
                    .iter()
                    .map(|&u| 1.0 / (mesh.position(u) - p).norm().max(1e-6))
                    .collect();
                let total: f64 = weights.iter().sum();
                triplets.extend(
                    neighbors
                        .iter()
                        .zip(&weights)
                        .map(|(u, w)| (i, u.index(), w / total)),
                );
            }
        }
    }

    CsrMatrix::from_triplets(n, n, triplets)
}

/// Options for [`filter_laplacian`] and [`filter_mut_dif_laplacian`].
#[derive(Debug, Clone)]
pub struct LaplacianOptions {
    /// Diffusion speed per pass.
    pub lambda: f64,

    /// Number of passes.
    pub iterations: usize,

    /// Solve `(I + λ(I - L)) x' = x` instead of stepping explicitly.
    /// Stable for any `lambda`.
    pub implicit_time_integration: bool,

    /// Restore the enclosed volume after each pass.
    pub volume_constraint: bool,

    /// Apply the operator to vertices in parallel (default: true).
    pub parallel: bool,
}

impl Default for LaplacianOptions {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            iterations: 10,
            implicit_time_integration: false,
            volume_constraint: true,
            parallel: true,
        }
    }
}

impl LaplacianOptions {
    /// Create options with the specified lambda value.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Create options with the specified number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Use implicit time integration.
    pub fn implicit(mut self) -> Self {
        self.implicit_time_integration = true;
        self
    }

    /// Let the enclosed volume change.
    pub fn without_volume_constraint(mut self) -> Self {
        self.volume_constraint = false;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Options for [`filter_humphrey`].
#[derive(Debug, Clone)]
pub struct HumphreyOptions {
    /// Weight of the original positions in the push back (0.0 to 1.0).
    pub alpha: f64,

    /// Weight of a vertex's own correction versus its neighbours' (0.0 to 1.0).
    pub beta: f64,

    /// Number of passes.
    pub iterations: usize,

    /// Apply the operator to vertices in parallel (default: true).
    pub parallel: bool,
}

impl Default for HumphreyOptions {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            beta: 0.5,
            iterations: 10,
            parallel: true,
        }
    }
}

impl HumphreyOptions {
    /// Create options with the specified alpha value.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Create options with the specified beta value.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Create options with the specified number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Options for [`filter_taubin`].
#[derive(Debug, Clone)]
pub struct TaubinOptions {
    /// Shrink factor for even passes.
    pub lambda: f64,

    /// Dilate factor for odd passes.
    pub nu: f64,

    /// Number of passes.
    pub iterations: usize,

    /// Apply the operator to vertices in parallel (default: true).
    pub parallel: bool,
}

impl Default for TaubinOptions {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            nu: 0.5,
            iterations: 10,
            parallel: true,
        }
    }
}

impl TaubinOptions {
    /// Create options with the specified lambda value.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Create options with the specified nu value.
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    /// Create options with the specified number of iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Laplacian smoothing.
///
/// Explicit passes move every vertex towards its neighbour average:
/// `x += λ(Lx - x)`. Implicit passes solve `(I + λ(I - L)) x' = x` per
/// coordinate with Gauss-Seidel, which stays stable for large `λ`.
///
/// With `volume_constraint` the mesh is scaled about the origin by
/// `(V₀ / V)^(1/3)` after each pass. The correction is skipped with a
/// warning when either volume is zero or their signs differ, which is always
/// the case for open meshes.
///
/// # Arguments
///
/// * `mesh` - The mesh to smooth (modified in place)
/// * `options` - Smoothing parameters
/// * `operator` - Laplacian to use, or `None` for the equal-weight operator
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a negative or non-finite `lambda`
/// - [`MeshError::LengthMismatch`] if `operator` does not match the vertex count
/// - [`MeshError::ConvergenceFailed`] if an implicit solve does not converge
///
/// # Example
///
/// ```
/// use surfquery::algo::smooth::{filter_laplacian, LaplacianOptions};
/// use surfquery::mesh::creation::icosphere;
///
/// let mut mesh = icosphere(2, 1.0);
/// let volume = mesh.volume();
/// filter_laplacian(&mut mesh, &LaplacianOptions::default(), None).unwrap();
/// assert!((mesh.volume() - volume).abs() < 1e-9);
/// ```
pub fn filter_laplacian<I: MeshIndex>(
    mesh: &mut TriMesh<I>,
    options: &LaplacianOptions,
    operator: Option<&CsrMatrix>,
) -> Result<()> {
    check_factor("lambda", options.lambda)?;
    let laplacian = resolve_operator(mesh, operator)?;
    let n = mesh.num_vertices();

    let system = if options.implicit_time_integration {
        Some(CsrMatrix::identity(n).linear_combination(
            1.0 + options.lambda,
            &laplacian,
            -options.lambda,
        )?)
    } else {
        None
    };

    let initial_volume = mesh.volume();
    let mut vertices = mesh.vertices().to_vec();

    for _ in 0..options.iterations {
        vertices = match &system {
            Some(a) => solve_per_coordinate(a, &vertices)?,
            None => {
                let averaged = apply(&laplacian, &vertices, options.parallel)?;
                vertices
                    .iter()
                    .zip(&averaged)
                    .map(|(p, q)| p + (q - p) * options.lambda)
                    .collect()
            }
        };

        if options.volume_constraint {
            restore_volume(&mut vertices, mesh, initial_volume);
        }
    }

    log::debug!(
        "Laplacian filter: {} {} passes, lambda {}",
        options.iterations,
        if system.is_some() { "implicit" } else { "explicit" },
        options.lambda
    );

    mesh.set_vertices(vertices)
}

/// Humphrey's classes Laplacian smoothing.
///
/// Each pass takes a Laplacian step, then pushes every vertex back by a blend
/// of its own offset from `alpha * original + (1 - alpha) * previous` and its
/// neighbours' offsets. This counteracts most of the shrinkage of plain
/// Laplacian smoothing.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] if `alpha` or `beta` is outside `[0, 1]`
/// - [`MeshError::LengthMismatch`] if `operator` does not match the vertex count
pub fn filter_humphrey<I: MeshIndex>(
    mesh: &mut TriMesh<I>,
    options: &HumphreyOptions,
    operator: Option<&CsrMatrix>,
) -> Result<()> {
    check_unit("alpha", options.alpha)?;
    check_unit("beta", options.beta)?;
    let laplacian = resolve_operator(mesh, operator)?;

    let original = mesh.vertices().to_vec();
    let mut vertices = original.clone();

    for _ in 0..options.iterations {
        let averaged = apply(&laplacian, &vertices, options.parallel)?;
        let offsets: Vec<Point3<f64>> = averaged
            .iter()
            .zip(&original)
            .zip(&vertices)
            .map(|((a, o), q)| {
                let target = o.coords * options.alpha + q.coords * (1.0 - options.alpha);
                Point3::from(a.coords - target)
            })
            .collect();
        let spread = apply(&laplacian, &offsets, options.parallel)?;

        vertices = averaged
            .iter()
            .zip(&offsets)
            .zip(&spread)
            .map(|((a, b), lb)| {
                a - (b.coords * options.beta + lb.coords * (1.0 - options.beta))
            })
            .collect();
    }

    log::debug!(
        "Humphrey filter: {} passes, alpha {}, beta {}",
        options.iterations,
        options.alpha,
        options.beta
    );

    mesh.set_vertices(vertices)
}

/// Taubin smoothing.
///
/// Even passes shrink with `x += λ(Lx - x)`, odd passes dilate with
/// `x -= ν(Lx - x)`. The alternation acts as a low-pass filter that removes
/// noise with little overall shrinkage.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a negative or non-finite `lambda` or `nu`
/// - [`MeshError::LengthMismatch`] if `operator` does not match the vertex count
pub fn filter_taubin<I: MeshIndex>(
    mesh: &mut TriMesh<I>,
    options: &TaubinOptions,
    operator: Option<&CsrMatrix>,
) -> Result<()> {
    check_factor("lambda", options.lambda)?;
    check_factor("nu", options.nu)?;
    let laplacian = resolve_operator(mesh, operator)?;

    let mut vertices = mesh.vertices().to_vec();
    for pass in 0..options.iterations {
        let factor = if pass % 2 == 0 {
            options.lambda
        } else {
            -options.nu
        };
        let averaged = apply(&laplacian, &vertices, options.parallel)?;
        for (p, q) in vertices.iter_mut().zip(&averaged) {
            *p += (q - *p) * factor;
        }
    }

    log::debug!(
        "Taubin filter: {} passes, lambda {}, nu {}",
        options.iterations,
        options.lambda,
        options.nu
    );

    mesh.set_vertices(vertices)
}

/// Laplacian smoothing with a per-vertex diffusion rate.
///
/// Each vertex `i` moves towards its neighbour average `q_i` by
/// `clamp(λ a_i / mean(a), 0.2λ, 1)` where `a_i = 1 / |n_i · (p_i - q_i)|`,
/// so vertices that already sit close to their neighbours' tangent plane
/// diffuse faster than features sticking out of it.
///
/// With `volume_constraint` each pass moves vertices along their normals to
/// restore the initial volume, using a volume-per-offset slope measured by
/// finite differences on the first pass with `ε = 0.01 · sqrt(max face area)`.
///
/// Vertex normals are recomputed from the current positions on every pass
/// instead of being taken once from the input mesh.
///
/// `implicit_time_integration` is ignored.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a negative or non-finite `lambda`
/// - [`MeshError::LengthMismatch`] if `operator` does not match the vertex count
pub fn filter_mut_dif_laplacian<I: MeshIndex>(
    mesh: &mut TriMesh<I>,
    options: &LaplacianOptions,
    operator: Option<&CsrMatrix>,
) -> Result<()> {
    check_factor("lambda", options.lambda)?;
    let laplacian = resolve_operator(mesh, operator)?;

    let initial_volume = mesh.volume();
    let max_face_area = mesh
        .face_ids()
        .map(|f| mesh.face_area(f))
        .fold(0.0_f64, f64::max);
    let eps = 0.01 * max_face_area.sqrt();
    let faces = mesh.faces();

    let mut vertices = mesh.vertices().to_vec();
    let mut offset_per_volume: Option<f64> = None;

    for _ in 0..options.iterations {
        let normals = vertex_normals(&vertices, faces);
        let averaged = apply(&laplacian, &vertices, options.parallel)?;

        let inverse_offsets: Vec<f64> = vertices
            .iter()
            .zip(&averaged)
            .zip(&normals)
            .map(|((p, q), n)| 1.0 / n.dot(&(p - q)).abs().max(1e-12))
            .collect();
        let mean = inverse_offsets.iter().sum::<f64>() / inverse_offsets.len().max(1) as f64;

        for ((p, q), a) in vertices.iter_mut().zip(&averaged).zip(&inverse_offsets) {
            let rate = (options.lambda * a / mean).min(1.0).max(0.2 * options.lambda);
            *p += (q - *p) * rate;
        }

        if options.volume_constraint {
            let volume = signed_volume(&vertices, faces);
            let slope = *offset_per_volume
                .get_or_insert_with(|| volume_slope(&vertices, faces, &normals, volume, eps));
            let offset = slope * (initial_volume - volume);
            for (p, n) in vertices.iter_mut().zip(&normals) {
                *p += n * offset;
            }
        }
    }

    log::debug!(
        "mutable diffusion Laplacian filter: {} passes, lambda {}",
        options.iterations,
        options.lambda
    );

    mesh.set_vertices(vertices)
}

fn resolve_operator<'a, I: MeshIndex>(
    mesh: &TriMesh<I>,
    operator: Option<&'a CsrMatrix>,
) -> Result<Cow<'a, CsrMatrix>> {
    let n = mesh.num_vertices();
    match operator {
        Some(l) if l.nrows() != n || l.ncols() != n => Err(MeshError::LengthMismatch {
            expected: n,
            actual: l.nrows(),
        }),
        Some(l) => Ok(Cow::Borrowed(l)),
        None => Ok(Cow::Owned(laplacian_operator(
            mesh,
            LaplacianWeighting::Equal,
            &[],
        )?)),
    }
}

fn apply(
    laplacian: &CsrMatrix,
    points: &[Point3<f64>],
    parallel: bool,
) -> Result<Vec<Point3<f64>>> {
    if parallel {
        laplacian.par_mul_points(points)
    } else {
        laplacian.mul_points(points)
    }
}

fn solve_per_coordinate(a: &CsrMatrix, vertices: &[Point3<f64>]) -> Result<Vec<Point3<f64>>> {
    let mut solved = vec![Point3::origin(); vertices.len()];
    for axis in 0..3 {
        let b = DVector::from_iterator(vertices.len(), vertices.iter().map(|p| p[axis]));
        let x = gauss_seidel(a, &b, Some(&b), IMPLICIT_MAX_SWEEPS, IMPLICIT_TOLERANCE)?;
        for (p, value) in solved.iter_mut().zip(x.iter()) {
            p[axis] = *value;
        }
    }
    Ok(solved)
}

/// Rescale about the origin so the enclosed volume returns to `target`.
fn restore_volume<I: MeshIndex>(vertices: &mut [Point3<f64>], mesh: &TriMesh<I>, target: f64) {
    let volume = signed_volume(vertices, mesh.faces());
    let ratio = target / volume;
    if !(ratio.is_finite() && ratio > 0.0) {
        log::warn!(
            "skipping volume correction: initial volume {target}, current volume {volume}"
        );
        return;
    }
    let scale = ratio.cbrt();
    for p in vertices.iter_mut() {
        p.coords *= scale;
    }
}

/// Offset along the normals per unit of volume change.
fn volume_slope<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[VertexId<I>; 3]],
    normals: &[Vector3<f64>],
    volume: f64,
    eps: f64,
) -> f64 {
    let inflated: Vec<Point3<f64>> = vertices
        .iter()
        .zip(normals)
        .map(|(p, n)| p + n * eps)
        .collect();
    let slope = eps / (signed_volume(&inflated, faces) - volume);
    if slope.is_finite() {
        slope
    } else {
        log::warn!("skipping volume correction: volume does not change along the normals");
        0.0
    }
}

fn check_factor(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MeshError::invalid_param(name, value, "must be finite and non-negative"))
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MeshError::invalid_param(name, value, "must be in [0, 1]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::creation::{grid, icosphere};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_sphere(seed: u64) -> TriMesh {
        let mut mesh = icosphere(3, 1.0);
        let mut rng = StdRng::seed_from_u64(seed);
        let vertices = mesh
            .vertices()
            .iter()
            .map(|p| Point3::from(p.coords * (1.0 + rng.gen_range(-0.05..0.05))))
            .collect();
        mesh.set_vertices(vertices).unwrap();
        mesh
    }

    /// Spread of vertex radii relative to their mean.
    fn roughness(mesh: &TriMesh) -> f64 {
        let radii: Vec<f64> = mesh.vertices().iter().map(|p| p.coords.norm()).collect();
        let mean = radii.iter().sum::<f64>() / radii.len() as f64;
        radii.iter().map(|r| (r - mean).abs()).sum::<f64>() / radii.len() as f64 / mean
    }

    #[test]
    fn test_operator_rows_average_neighbors() {
        let mesh = icosphere(1, 1.0);
        let l = laplacian_operator(&mesh, LaplacianWeighting::Equal, &[]).unwrap();
        let adjacency = mesh.adjacency();
        for v in mesh.vertex_ids() {
            let (cols, values) = l.row(v.index());
            assert_eq!(cols.len(), adjacency.vertex_neighbors(v).len());
            assert!((values.iter().sum::<f64>() - 1.0).abs() < 1e-12);
            assert!(l.get(v.index(), v.index()) == 0.0);
        }
    }

    #[test]
    fn test_operator_umbrella_prefers_close_neighbors() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        ];
        let mesh: TriMesh = TriMesh::new(&vertices, &[[0, 1, 2]]).unwrap();
        let l = laplacian_operator(&mesh, LaplacianWeighting::Umbrella, &[]).unwrap();
        // weights 1/1 and 1/3, normalised
        assert!((l.get(0, 1) - 0.75).abs() < 1e-12);
        assert!((l.get(0, 2) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_operator_pinned_and_isolated_rows_are_identity() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
        ];
        let mesh: TriMesh = TriMesh::new(&vertices, &[[0, 1, 2]]).unwrap();
        let l = laplacian_operator(&mesh, LaplacianWeighting::Equal, &[VertexId::new(1)]).unwrap();
        assert_eq!(l.row(1), (&[1usize][..], &[1.0][..]));
        assert_eq!(l.row(3), (&[3usize][..], &[1.0][..]));

        let err = laplacian_operator(&mesh, LaplacianWeighting::Equal, &[VertexId::new(9)])
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "pinned", .. }));
    }

    #[test]
    fn test_laplacian_reduces_noise_and_keeps_volume() {
        let mut mesh = noisy_sphere(1);
        let volume = mesh.volume();
        let before = roughness(&mesh);

        filter_laplacian(&mut mesh, &LaplacianOptions::default(), None).unwrap();

        assert!(roughness(&mesh) < before * 0.5);
        assert!((mesh.volume() - volume).abs() < 1e-9 * volume);
    }

    #[test]
    fn test_laplacian_without_constraint_shrinks() {
        let mut mesh = icosphere(2, 1.0);
        let volume = mesh.volume();
        let options = LaplacianOptions::default().without_volume_constraint();
        filter_laplacian(&mut mesh, &options, None).unwrap();
        assert!(mesh.volume() < volume * 0.95);
    }

    #[test]
    fn test_implicit_laplacian() {
        let mut mesh = noisy_sphere(2);
        let volume = mesh.volume();
        let before = roughness(&mesh);

        let options = LaplacianOptions::default().with_iterations(3).implicit();
        filter_laplacian(&mut mesh, &options, None).unwrap();

        assert!(roughness(&mesh) < before);
        assert!((mesh.volume() - volume).abs() < 1e-9 * volume);

        // Large steps stay bounded
        let mut mesh = noisy_sphere(2);
        let options = LaplacianOptions::default()
            .with_lambda(20.0)
            .with_iterations(2)
            .implicit()
            .without_volume_constraint();
        filter_laplacian(&mut mesh, &options, None).unwrap();
        let bounds = mesh.bounding_box().unwrap();
        assert!(bounds.diagonal_length() < 4.0);
    }

    #[test]
    fn test_pinned_vertices_stay_fixed() {
        let mut mesh = grid(4, 1.0);
        let mut vertices = mesh.vertices().to_vec();
        let bump = 2 * 5 + 2;
        vertices[bump].z = 1.0;
        mesh.set_vertices(vertices).unwrap();

        let pinned: Vec<VertexId> = mesh
            .vertex_ids()
            .filter(|v| {
                let (i, j) = (v.index() % 5, v.index() / 5);
                i == 0 || j == 0 || i == 4 || j == 4
            })
            .collect();
        let l = laplacian_operator(&mesh, LaplacianWeighting::Equal, &pinned).unwrap();
        let before = mesh.vertices().to_vec();

        let options = LaplacianOptions::default().without_volume_constraint();
        filter_laplacian(&mut mesh, &options, Some(&l)).unwrap();

        for v in &pinned {
            assert_eq!(mesh.position(*v), &before[v.index()]);
        }
        assert!(mesh.vertices()[bump].z < 0.5);
        assert!(mesh.vertices()[bump].z > 0.0);
    }

    #[test]
    fn test_taubin_shrinks_less_than_laplacian() {
        let mut laplacian = icosphere(2, 1.0);
        let mut taubin = laplacian.clone();
        let volume = laplacian.volume();

        let options = LaplacianOptions::default().without_volume_constraint();
        filter_laplacian(&mut laplacian, &options, None).unwrap();
        filter_taubin(&mut taubin, &TaubinOptions::default(), None).unwrap();

        assert!(taubin.volume() > laplacian.volume());
        assert!(taubin.volume() <= volume);
    }

    #[test]
    fn test_humphrey_reduces_noise_with_little_shrinkage() {
        let mut humphrey = noisy_sphere(3);
        let mut laplacian = humphrey.clone();
        let before = roughness(&humphrey);

        filter_humphrey(&mut humphrey, &HumphreyOptions::default(), None).unwrap();
        let options = LaplacianOptions::default().without_volume_constraint();
        filter_laplacian(&mut laplacian, &options, None).unwrap();

        assert!(roughness(&humphrey) < before);
        assert!(humphrey.volume() > laplacian.volume());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let original = noisy_sphere(8);
        let run = |filter: &dyn Fn(&mut TriMesh)| {
            let mut mesh = original.clone();
            filter(&mut mesh);
            mesh.vertices().to_vec()
        };

        let laplacian = LaplacianOptions::default();
        assert_eq!(
            run(&|m: &mut TriMesh| filter_laplacian(m, &laplacian, None).unwrap()),
            run(&|m: &mut TriMesh| filter_laplacian(m, &laplacian.clone().sequential(), None).unwrap())
        );
        assert_eq!(
            run(&|m: &mut TriMesh| filter_mut_dif_laplacian(m, &laplacian, None).unwrap()),
            run(&|m: &mut TriMesh| filter_mut_dif_laplacian(m, &laplacian.clone().sequential(), None).unwrap())
        );

        let humphrey = HumphreyOptions::default();
        assert_eq!(
            run(&|m: &mut TriMesh| filter_humphrey(m, &humphrey, None).unwrap()),
            run(&|m: &mut TriMesh| filter_humphrey(m, &humphrey.clone().sequential(), None).unwrap())
        );

        let taubin = TaubinOptions::default();
        assert_eq!(
            run(&|m: &mut TriMesh| filter_taubin(m, &taubin, None).unwrap()),
            run(&|m: &mut TriMesh| filter_taubin(m, &taubin.clone().sequential(), None).unwrap())
        );
    }

    #[test]
    fn test_mut_dif_laplacian_keeps_volume_approximately() {
        let mut mesh = noisy_sphere(4);
        let volume = mesh.volume();
        let before = roughness(&mesh);

        filter_mut_dif_laplacian(&mut mesh, &LaplacianOptions::default(), None).unwrap();

        assert!(roughness(&mesh) < before);
        assert!((mesh.volume() - volume).abs() < 0.02 * volume);
    }

    #[test]
    fn test_zero_iterations_no_change() {
        let mut mesh = noisy_sphere(5);
        let before = mesh.vertices().to_vec();
        let options = LaplacianOptions::default().with_iterations(0);
        filter_laplacian(&mut mesh, &options, None).unwrap();
        filter_taubin(&mut mesh, &TaubinOptions::default().with_iterations(0), None).unwrap();
        assert_eq!(mesh.vertices(), before.as_slice());
    }

    #[test]
    fn test_filter_drops_spatial_index() {
        let mut mesh = icosphere(1, 1.0);
        mesh.spatial_index().unwrap();
        assert!(mesh.has_spatial_index());
        filter_taubin(&mut mesh, &TaubinOptions::default(), None).unwrap();
        assert!(!mesh.has_spatial_index());
    }

    #[test]
    fn test_invalid_parameters() {
        let mut mesh = icosphere(1, 1.0);
        let before = mesh.vertices().to_vec();

        let err = filter_laplacian(&mut mesh, &LaplacianOptions::default().with_lambda(-1.0), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "lambda", .. }));

        let err = filter_humphrey(&mut mesh, &HumphreyOptions::default().with_alpha(1.5), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "alpha", .. }));

        let err = filter_humphrey(&mut mesh, &HumphreyOptions::default().with_beta(-0.1), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "beta", .. }));

        let err = filter_taubin(&mut mesh, &TaubinOptions::default().with_nu(f64::NAN), None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "nu", .. }));

        let wrong = CsrMatrix::identity(3);
        let err = filter_taubin(&mut mesh, &TaubinOptions::default(), Some(&wrong)).unwrap_err();
        assert!(matches!(err, MeshError::LengthMismatch { .. }));

        assert_eq!(mesh.vertices(), before.as_slice());
    }
}
