//! surfquery CLI - run spatial queries against built-in meshes.
//!
//! Usage: surfquery [--sequential] <COMMAND> [OPTIONS]
//!
//! Run `surfquery --help` for available commands. Set `RUST_LOG=debug` to see
//! index builds and filter passes.

use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use surfquery::algo::{curvature, sample, smooth};
use surfquery::mesh::{creation, TriMesh};
use surfquery::query::{NearestOptions, RayOptions};
use surfquery::spatial::{IndexOptions, SplitRule};

#[derive(Parser)]
#[command(name = "surfquery")]
#[command(author, version, about = "Triangle mesh query CLI", long_about = None)]
struct Cli {
    /// Use single-threaded execution (for benchmarking)
    #[arg(long, global = true)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Closest surface points for random points around a mesh
    Nearest {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Number of query points
        #[arg(short = 'n', long, default_value = "10000")]
        count: usize,

        /// Random seed for the query points
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Spatial index split rule
        #[arg(long, value_enum, default_value = "median")]
        split: Split,
    },

    /// Cast random rays at a mesh
    Rays {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Number of rays
        #[arg(short = 'n', long, default_value = "10000")]
        count: usize,

        /// Random seed for the rays
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Curvature measures at every vertex
    Curvature {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Ball radius
        #[arg(short, long, default_value = "0.25")]
        radius: f64,

        /// Which measure to compute
        #[arg(short, long, value_enum, default_value = "mean")]
        kind: Kind,
    },

    /// Add noise to a mesh and smooth it
    Smooth {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Smoothing method
        #[arg(short, long, value_enum, default_value = "laplacian")]
        method: SmoothMethod,

        /// Number of iterations
        #[arg(short, long, default_value = "10")]
        iterations: usize,

        /// Smoothing factor
        #[arg(short, long, default_value = "0.5")]
        lambda: f64,

        /// Relative noise amplitude added before smoothing
        #[arg(long, default_value = "0.02")]
        noise: f64,

        /// Random seed for the noise
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(clap::Args)]
struct ShapeArgs {
    /// Built-in mesh to query
    #[arg(short, long, value_enum, default_value = "sphere")]
    shape: Shape,

    /// Subdivision level (sphere) or cells per side (grid)
    #[arg(short = 'd', long, default_value = "4")]
    detail: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Shape {
    /// Unit icosphere
    Sphere,
    /// Unit cube centred at the origin
    Cube,
    /// Flat unit square grid in the XY plane
    Grid,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Split {
    /// Split at the median centroid
    Median,
    /// Surface area heuristic
    Sah,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Kind {
    /// Gaussian curvature measure
    Gaussian,
    /// Mean curvature measure
    Mean,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SmoothMethod {
    /// Explicit Laplacian smoothing with volume constraint
    Laplacian,
    /// Implicit Laplacian smoothing with volume constraint
    Implicit,
    /// Humphrey's classes smoothing
    Humphrey,
    /// Taubin smoothing (shrinkage-resistant)
    Taubin,
    /// Laplacian with per-vertex diffusion rate
    MutDif,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let sequential = cli.sequential;
    match cli.command {
        Commands::Nearest {
            shape,
            count,
            seed,
            split,
        } => cmd_nearest(&shape, count, seed, split, sequential)?,

        Commands::Rays { shape, count, seed } => cmd_rays(&shape, count, seed, sequential)?,

        Commands::Curvature {
            shape,
            radius,
            kind,
        } => cmd_curvature(&shape, radius, kind, sequential)?,

        Commands::Smooth {
            shape,
            method,
            iterations,
            lambda,
            noise,
            seed,
        } => cmd_smooth(&shape, method, iterations, lambda, noise, seed, sequential)?,
    }

    Ok(())
}

fn build_shape(args: &ShapeArgs, sequential: bool) -> TriMesh {
    let mesh = match args.shape {
        Shape::Sphere => creation::icosphere(args.detail, 1.0),
        Shape::Cube => creation::cuboid(Vector3::new(1.0, 1.0, 1.0)),
        Shape::Grid => creation::grid(args.detail.max(1), 1.0 / args.detail.max(1) as f64),
    };
    let options = if sequential {
        IndexOptions::default().sequential()
    } else {
        IndexOptions::default()
    };
    log::info!(
        "Built mesh: {} vertices, {} faces",
        mesh.num_vertices(),
        mesh.num_faces()
    );
    mesh.with_index_options(options)
}

fn mode(sequential: bool) -> &'static str {
    if sequential {
        "sequential"
    } else {
        "parallel"
    }
}

fn summary(values: &[f64]) -> (f64, f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
    (min, max, avg)
}

fn cmd_nearest(
    shape: &ShapeArgs,
    count: usize,
    seed: u64,
    split: Split,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh = build_shape(shape, sequential);
    let rule = match split {
        Split::Median => SplitRule::Median,
        Split::Sah => SplitRule::SurfaceAreaHeuristic,
    };
    let index_options = mesh.index_options().clone().with_split(rule);
    mesh.set_index_options(index_options);

    let bounds = mesh.bounding_box().ok_or("mesh has no vertices")?;
    let region = bounds.padded(0.25 * bounds.diagonal_length());
    let points = sample::sample_volume_seeded(&region, count, seed);

    let start = Instant::now();
    let stats = mesh.spatial_index()?.stats();
    println!(
        "Index: {} leaves, {} internal nodes, depth {} ({:.2?})",
        stats.leaf_count,
        stats.internal_count,
        stats.depth,
        start.elapsed()
    );

    let options = NearestOptions {
        parallel: !sequential,
    };
    println!("Querying {} points ({})...", count, mode(sequential));
    let start = Instant::now();
    let closest = mesh.nearest().with_options(options.clone()).on_surface(&points)?;
    let signed = mesh.nearest().with_options(options).signed_distance(&points)?;
    let elapsed = start.elapsed();

    let (min, max, avg) = summary(&closest.distances);
    let inside = signed.iter().filter(|&&d| d > 0.0).count();
    println!("Distance: min={:.6}, max={:.6}, avg={:.6}", min, max, avg);
    println!("Inside: {} of {} ({:.2?})", inside, count, elapsed);

    Ok(())
}

fn cmd_rays(
    shape: &ShapeArgs,
    count: usize,
    seed: u64,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = build_shape(shape, sequential);
    let bounds = mesh.bounding_box().ok_or("mesh has no vertices")?;
    let center = bounds.center();
    let distance = 2.0 * bounds.diagonal_length();

    // Origins on a sphere around the mesh, aimed near its centre
    let mut rng = StdRng::seed_from_u64(seed);
    let mut origins = Vec::with_capacity(count);
    let mut directions = Vec::with_capacity(count);
    for _ in 0..count {
        let around = random_unit(&mut rng);
        let origin = center + around * distance;
        let target = center + random_unit(&mut rng) * (0.25 * bounds.diagonal_length());
        origins.push(origin);
        directions.push(target - origin);
    }

    let options = if sequential {
        RayOptions::default().sequential()
    } else {
        RayOptions::default()
    };
    println!("Casting {} rays ({})...", count, mode(sequential));

    let start = Instant::now();
    let query = mesh.ray().with_options(options);
    let hits = query.intersects_location(&origins, &directions)?;
    let first = query.intersects_first(&origins, &directions)?;
    let elapsed = start.elapsed();

    let counts = hits.counts(count);
    let hit_rays = first.iter().filter(|f| f.is_some()).count();
    let max_hits = counts.iter().copied().max().unwrap_or(0);
    println!("Hits: {} total, {} rays hit, at most {} per ray", hits.len(), hit_rays, max_hits);
    println!("Elapsed: {:.2?}", elapsed);

    Ok(())
}

fn random_unit(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm = v.norm();
        if norm > 1e-3 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn cmd_curvature(
    shape: &ShapeArgs,
    radius: f64,
    kind: Kind,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = build_shape(shape, sequential);
    let kind = match kind {
        Kind::Gaussian => curvature::CurvatureKind::Gaussian,
        Kind::Mean => curvature::CurvatureKind::Mean,
    };
    let points: Vec<Point3<f64>> = mesh.vertices().to_vec();

    println!(
        "Computing {:?} curvature at {} vertices (radius={}, {})...",
        kind,
        points.len(),
        radius,
        mode(sequential)
    );
    let start = Instant::now();
    let values = if sequential {
        curvature::curvature_measure_sequential(&mesh, &points, radius, kind)?
    } else {
        curvature::curvature_measure(&mesh, &points, radius, kind)?
    };
    let elapsed = start.elapsed();

    let (min, max, avg) = summary(&values);
    println!("  {:?}: min={:.4}, max={:.4}, avg={:.4}", kind, min, max, avg);

    // Gauss-Bonnet check
    let total_defect: f64 = curvature::vertex_defects(&mesh)
        .iter()
        .zip(mesh.vertex_ids())
        .filter(|(_, v)| mesh.adjacency().is_referenced(*v))
        .map(|(d, _)| d)
        .sum();
    println!(
        "  Gauss-Bonnet Euler characteristic: {:.2}",
        total_defect / (2.0 * std::f64::consts::PI)
    );
    println!("Elapsed: {:.2?}", elapsed);

    Ok(())
}

fn cmd_smooth(
    shape: &ShapeArgs,
    method: SmoothMethod,
    iterations: usize,
    lambda: f64,
    noise: f64,
    seed: u64,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mesh = build_shape(shape, sequential);

    let mut rng = StdRng::seed_from_u64(seed);
    let scale = noise.abs() * mesh.bounding_box().map_or(1.0, |b| b.diagonal_length());
    let noisy: Vec<Point3<f64>> = mesh
        .vertices()
        .iter()
        .map(|p| p + random_unit(&mut rng) * rng.gen_range(0.0..=scale))
        .collect();
    mesh.set_vertices(noisy)?;

    println!("Before: volume={:.6}, area={:.6}", mesh.volume(), mesh.area());

    let mut laplacian = smooth::LaplacianOptions::default()
        .with_lambda(lambda)
        .with_iterations(iterations);
    laplacian.parallel = !sequential;

    let start = Instant::now();
    match method {
        SmoothMethod::Laplacian => {
            println!(
                "Applying Laplacian smoothing ({} iterations, lambda={}, {})...",
                iterations,
                lambda,
                mode(sequential)
            );
            smooth::filter_laplacian(&mut mesh, &laplacian, None)?;
        }
        SmoothMethod::Implicit => {
            println!("Applying implicit Laplacian smoothing ({} iterations, lambda={})...", iterations, lambda);
            smooth::filter_laplacian(&mut mesh, &laplacian.implicit(), None)?;
        }
        SmoothMethod::Humphrey => {
            println!("Applying Humphrey smoothing ({} iterations)...", iterations);
            let mut options = smooth::HumphreyOptions::default().with_iterations(iterations);
            options.parallel = !sequential;
            smooth::filter_humphrey(&mut mesh, &options, None)?;
        }
        SmoothMethod::Taubin => {
            println!("Applying Taubin smoothing ({} iterations, lambda={})...", iterations, lambda);
            let mut options = smooth::TaubinOptions::default()
                .with_lambda(lambda)
                .with_iterations(iterations);
            options.parallel = !sequential;
            smooth::filter_taubin(&mut mesh, &options, None)?;
        }
        SmoothMethod::MutDif => {
            println!("Applying mutable diffusion smoothing ({} iterations, lambda={})...", iterations, lambda);
            smooth::filter_mut_dif_laplacian(&mut mesh, &laplacian, None)?;
        }
    }
    let elapsed = start.elapsed();

    println!("After: volume={:.6}, area={:.6} ({:.2?})", mesh.volume(), mesh.area(), elapsed);

    Ok(())
}
