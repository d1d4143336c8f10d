//! Ray casting against a mesh.
//!
//! Every ray walks the mesh's [`SpatialIndex`](crate::spatial::SpatialIndex)
//! with a slab test and runs Möller–Trumbore on the triangles of each leaf
//! it reaches. Triangle edges are inclusive, so a ray through a shared edge
//! or vertex is first reported by every triangle touching it; those hits are
//! then merged into one, keeping the lowest face index.
//!
//! # Example
//!
//! ```
//! use surfquery::mesh::creation::icosphere;
//! use nalgebra::{Point3, Vector3};
//!
//! let sphere = icosphere(2, 1.0);
//! let hits = sphere
//!     .ray()
//!     .intersects_location(&[Point3::new(0.0, 0.0, -3.0)], &[Vector3::z()])
//!     .unwrap();
//! // Enters and leaves the sphere
//! assert_eq!(hits.len(), 2);
//! ```

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::error::{MeshError, Result};
use crate::geometry::triangle::ray_triangle_intersect;
use crate::geometry::Ray;
use crate::mesh::{FaceId, MeshIndex, TriMesh};
use crate::spatial::SpatialIndex;

/// Hits closer than this fraction of the scene scale are the same hit.
pub const MERGE_TOLERANCE: f64 = 1e-9;

/// Direction used for containment tests; deliberately not axis aligned.
const CONTAINS_DIRECTION: [f64; 3] = [0.4395064455, 0.617598629942, 0.652231566745];

/// Fallback direction when the first two containment casts disagree.
const TIEBREAK_DIRECTION: [f64; 3] = [-0.2357022604, 0.8164965809, -0.5270462767];

/// Options for ray queries.
#[derive(Debug, Clone, PartialEq)]
pub struct RayOptions {
    /// Report every hit along each ray rather than only the first
    /// (default: true).
    pub multiple_hits: bool,

    /// Also report hits at negative ray parameters (default: false).
    pub include_behind_origin: bool,

    /// Process rays in parallel (default: true).
    pub parallel: bool,
}

impl Default for RayOptions {
    fn default() -> Self {
        Self {
            multiple_hits: true,
            include_behind_origin: false,
            parallel: true,
        }
    }
}

impl RayOptions {
    /// Report at most one hit per ray.
    pub fn first_hit_only(mut self) -> Self {
        self.multiple_hits = false;
        self
    }

    /// Report hits behind the ray origins too.
    pub fn with_behind_origin(mut self, include: bool) -> Self {
        self.include_behind_origin = include;
        self
    }

    /// Process rays one after another.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Ray hits as parallel arrays, ordered by ray index and then distance.
#[derive(Debug, Clone, PartialEq)]
pub struct RayHits<I: MeshIndex = u32> {
    /// Hit locations.
    pub locations: Vec<Point3<f64>>,
    /// Index of the ray producing each hit.
    pub ray_indices: Vec<usize>,
    /// Triangle hit.
    pub faces: Vec<FaceId<I>>,
    /// Ray parameter of each hit, the distance along the normalised direction.
    pub distances: Vec<f64>,
}

impl<I: MeshIndex> Default for RayHits<I> {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            ray_indices: Vec::new(),
            faces: Vec::new(),
            distances: Vec::new(),
        }
    }
}

impl<I: MeshIndex> RayHits<I> {
    /// Total number of hits.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no ray hit anything.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of hits per ray for `num_rays` rays.
    ///
    /// The result grows past `num_rays` if a hit belongs to a later ray.
    pub fn counts(&self, num_rays: usize) -> Vec<usize> {
        let len = self
            .ray_indices
            .iter()
            .map(|&r| r + 1)
            .max()
            .map_or(num_rays, |n| n.max(num_rays));
        let mut counts = vec![0; len];
        for &r in &self.ray_indices {
            counts[r] += 1;
        }
        counts
    }
}

/// Ray queries against one mesh.
///
/// Obtained from [`TriMesh::ray`].
#[derive(Debug, Clone)]
pub struct RayQuery<'a, I: MeshIndex = u32> {
    mesh: &'a TriMesh<I>,
    options: RayOptions,
}

impl<I: MeshIndex> TriMesh<I> {
    /// Ray queries with default options.
    pub fn ray(&self) -> RayQuery<'_, I> {
        RayQuery {
            mesh: self,
            options: RayOptions::default(),
        }
    }
}

type Hits<I> = SmallVec<[(f64, FaceId<I>); 4]>;

impl<'a, I: MeshIndex> RayQuery<'a, I> {
    /// Replace the query options.
    pub fn with_options(mut self, options: RayOptions) -> Self {
        self.options = options;
        self
    }

    /// Hit locations of every ray.
    ///
    /// # Errors
    ///
    /// - [`MeshError::LengthMismatch`] if `origins` and `directions` differ in length
    /// - [`MeshError::DegenerateRay`] for a zero or non-finite direction or a non-finite origin
    /// - [`MeshError::EmptyMesh`] if the mesh has no triangles
    pub fn intersects_location(
        &self,
        origins: &[Point3<f64>],
        directions: &[Vector3<f64>],
    ) -> Result<RayHits<I>> {
        let rays = make_rays(origins, directions)?;
        let per_ray = self.cast_all(&rays, &self.options)?;

        let mut hits = RayHits::default();
        for (ri, (ray, ray_hits)) in rays.iter().zip(per_ray).enumerate() {
            for (t, face) in ray_hits {
                hits.locations.push(ray.at(t));
                hits.ray_indices.push(ri);
                hits.faces.push(face);
                hits.distances.push(t);
            }
        }
        Ok(hits)
    }

    /// First triangle hit by each ray, if any.
    pub fn intersects_first(
        &self,
        origins: &[Point3<f64>],
        directions: &[Vector3<f64>],
    ) -> Result<Vec<Option<FaceId<I>>>> {
        let rays = make_rays(origins, directions)?;
        let options = self.options.clone().first_hit_only();
        Ok(self
            .cast_all(&rays, &options)?
            .into_iter()
            .map(|hits| hits.first().map(|&(_, f)| f))
            .collect())
    }

    /// Whether each ray hits anything.
    pub fn intersects_any(
        &self,
        origins: &[Point3<f64>],
        directions: &[Vector3<f64>],
    ) -> Result<Vec<bool>> {
        Ok(self
            .intersects_first(origins, directions)?
            .into_iter()
            .map(|f| f.is_some())
            .collect())
    }

    /// Whether each point is inside the mesh, by crossing parity.
    ///
    /// Casts along a fixed direction and the opposite one. If the two
    /// parities disagree (the ray grazed an edge or the mesh has a hole), a
    /// third direction decides by majority. Points outside the mesh bounds
    /// are outside. Only meaningful for closed meshes.
    pub fn contains_points(&self, points: &[Point3<f64>]) -> Result<Vec<bool>> {
        let index = self.mesh.spatial_index()?;
        if let Some(i) = points.iter().position(|p| !p.iter().all(|c| c.is_finite())) {
            return Err(MeshError::invalid_param(
                "points",
                i,
                "query point has a non-finite coordinate",
            ));
        }

        let bounds = *index.bounds();
        let scale = bounds.diagonal_length();
        let options = RayOptions {
            multiple_hits: true,
            include_behind_origin: false,
            parallel: self.options.parallel,
        };
        let dir = Vector3::from(CONTAINS_DIRECTION);
        let tiebreak = Vector3::from(TIEBREAK_DIRECTION);

        let parity = |p: &Point3<f64>, d: Vector3<f64>| {
            Ray::new(*p, d).map_or(false, |ray| {
                cast(self.mesh, index, &ray, &options, scale).len() % 2 == 1
            })
        };
        let contains = |p: &Point3<f64>| {
            if !bounds.contains_point(p) {
                return false;
            }
            let forward = parity(p, dir);
            let backward = parity(p, -dir);
            if forward == backward {
                return forward;
            }
            let votes = [forward, backward, parity(p, tiebreak)];
            votes.iter().filter(|&&inside| inside).count() >= 2
        };

        Ok(if self.options.parallel {
            points.par_iter().map(contains).collect()
        } else {
            points.iter().map(contains).collect()
        })
    }

    fn cast_all(&self, rays: &[Ray], options: &RayOptions) -> Result<Vec<Hits<I>>> {
        let index = self.mesh.spatial_index()?;
        let scale = index.bounds().diagonal_length();
        let run = |ray: &Ray| cast(self.mesh, index, ray, options, scale);
        Ok(if options.parallel {
            rays.par_iter().map(run).collect()
        } else {
            rays.iter().map(run).collect()
        })
    }
}

fn make_rays(origins: &[Point3<f64>], directions: &[Vector3<f64>]) -> Result<Vec<Ray>> {
    if origins.len() != directions.len() {
        return Err(MeshError::LengthMismatch {
            expected: origins.len(),
            actual: directions.len(),
        });
    }
    origins
        .iter()
        .zip(directions)
        .enumerate()
        .map(|(i, (o, d))| Ray::new(*o, *d).ok_or(MeshError::DegenerateRay { ray: i }))
        .collect()
}

struct CastState<I: MeshIndex> {
    hits: Hits<I>,
    t_max: f64,
}

/// All admissible hits of one ray, merged and sorted by distance.
fn cast<I: MeshIndex>(
    mesh: &TriMesh<I>,
    index: &SpatialIndex<I>,
    ray: &Ray,
    options: &RayOptions,
    scene_scale: f64,
) -> Hits<I> {
    let t_min = if options.include_behind_origin {
        f64::NEG_INFINITY
    } else {
        0.0
    };
    let scale = scene_scale + (ray.origin - index.bounds().center()).norm();
    let tolerance = MERGE_TOLERANCE * scale.max(f64::MIN_POSITIVE);
    let first_only = !options.multiple_hits;

    let mut state = CastState {
        hits: Hits::new(),
        t_max: f64::INFINITY,
    };
    index.traverse(
        &mut state,
        |state, bbox| {
            bbox.padded(tolerance)
                .ray_interval(ray, t_min, state.t_max)
                .map(|(lo, _)| lo)
        },
        |state, faces| {
            for &f in faces {
                let [a, b, c] = mesh.face_positions(f);
                let Some(hit) = ray_triangle_intersect(ray, &a, &b, &c) else {
                    continue;
                };
                if hit.t < t_min || hit.t > state.t_max {
                    continue;
                }
                state.hits.push((hit.t, f));
                if first_only {
                    // Keep hits within tolerance of the best so the merge can
                    // still pick the lowest face index.
                    state.t_max = state.t_max.min(hit.t + tolerance);
                }
            }
        },
    );

    let mut hits = merge_hits(state.hits, tolerance);
    if first_only {
        hits.truncate(1);
    }
    hits
}

/// Sort hits by distance and collapse runs within `tolerance` of the run's
/// first hit into one, keeping that distance and the lowest face index.
fn merge_hits<I: MeshIndex>(mut hits: Hits<I>, tolerance: f64) -> Hits<I> {
    hits.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut merged = Hits::new();
    let mut i = 0;
    while i < hits.len() {
        let (t0, mut face) = hits[i];
        let mut j = i + 1;
        while j < hits.len() && hits[j].0 - t0 <= tolerance {
            face = face.min(hits[j].1);
            j += 1;
        }
        merged.push((t0, face));
        i = j;
    }
    merged
}
