//! Mesh processing algorithms.
//!
//! - **Curvature**: discrete Gaussian and mean curvature measures over balls
//! - **Smoothing**: Laplacian, Humphrey, Taubin and mutable diffusion filters
//! - **Sampling**: area-weighted surface sampling and box sampling
//! - **Sparse**: CSR matrices and the Gauss-Seidel solver behind implicit smoothing

pub mod curvature;
pub mod sample;
pub mod smooth;
pub mod sparse;
