//! Error types for surfquery.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh construction and queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    /// The mesh has no faces to query against.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A vertex has a NaN or infinite coordinate.
    #[error("vertex {vertex} has a non-finite coordinate")]
    NonFiniteVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// The mesh has more elements than the index type can address.
    #[error("{count} elements exceed the index type limit of {max}")]
    IndexOverflow {
        /// Number of elements requested.
        count: usize,
        /// Largest addressable element count.
        max: usize,
    },

    /// A ray has a zero-length or non-finite direction, or a non-finite origin.
    #[error("ray {ray} is degenerate (zero-length or non-finite)")]
    DegenerateRay {
        /// Index of the offending ray.
        ray: usize,
    },

    /// Curvature ball radius must be positive and finite.
    #[error("invalid curvature radius {radius}: must be positive and finite")]
    InvalidRadius {
        /// The rejected radius.
        radius: f64,
    },

    /// Two parallel input arrays have different lengths.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Length of the reference array.
        expected: usize,
        /// Length of the mismatching array.
        actual: usize,
    },

    /// Algorithm failed to converge.
    #[error("algorithm failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Whether this error reports malformed mesh input (bad indices,
    /// non-finite coordinates, or too many elements).
    pub fn is_invalid_mesh(&self) -> bool {
        matches!(
            self,
            MeshError::InvalidVertexIndex { .. }
                | MeshError::NonFiniteVertex { .. }
                | MeshError::IndexOverflow { .. }
        )
    }
}
