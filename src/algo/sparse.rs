//! Compressed sparse row matrices and a Gauss-Seidel solver.
//!
//! Just enough linear algebra for mesh operators: assembly from triplets,
//! matrix-vector products applied column-wise to vertex positions, and an
//! iterative solver for the diagonally dominant systems that implicit
//! smoothing produces.

use nalgebra::{DVector, Point3, Vector3};
use rayon::prelude::*;

use crate::error::{MeshError, Result};

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` indexes the entries of row `i`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries at the same position are summed. Entries outside
    /// the shape are rejected with [`MeshError::InvalidParameter`].
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        mut triplets: Vec<(usize, usize, f64)>,
    ) -> Result<Self> {
        if let Some(&(r, c, _)) = triplets.iter().find(|&&(r, c, _)| r >= rows || c >= cols) {
            return Err(MeshError::invalid_param(
                "triplets",
                format!("({r}, {c})"),
                "entry outside the matrix shape",
            ));
        }

        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            match values.last_mut() {
                Some(acc) if last == Some((row, col)) => *acc += val,
                _ => {
                    col_idx.push(col);
                    values.push(val);
                    row_ptr[row + 1] += 1;
                    last = Some((row, col));
                }
            }
        }
        for i in 0..rows {
            row_ptr[i + 1] += row_ptr[i];
        }

        Ok(Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// The `n` x `n` identity.
    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Entry at `(i, j)`, zero if not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (cols, values) = self.row(i);
        cols.binary_search(&j).map_or(0.0, |k| values[k])
    }

    /// Multiply matrix by vector: y = A * x.
    ///
    /// # Errors
    ///
    /// [`MeshError::LengthMismatch`] if `x` does not have `ncols` entries.
    pub fn mul_vec(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_cols(x.len())?;
        Ok(DVector::from_fn(self.rows, |i, _| {
            let (cols, values) = self.row(i);
            cols.iter().zip(values).map(|(&j, v)| v * x[j]).sum()
        }))
    }

    /// Apply the matrix to each coordinate of a list of points.
    ///
    /// # Errors
    ///
    /// [`MeshError::LengthMismatch`] if there are not `ncols` points.
    pub fn mul_points(&self, points: &[Point3<f64>]) -> Result<Vec<Point3<f64>>> {
        self.check_cols(points.len())?;
        Ok((0..self.rows).map(|i| self.row_points(i, points)).collect())
    }

    /// [`mul_points`](Self::mul_points) with rows computed in parallel.
    ///
    /// Each row is summed in the same order, so the result is identical.
    pub fn par_mul_points(&self, points: &[Point3<f64>]) -> Result<Vec<Point3<f64>>> {
        self.check_cols(points.len())?;
        Ok((0..self.rows)
            .into_par_iter()
            .map(|i| self.row_points(i, points))
            .collect())
    }

    fn row_points(&self, i: usize, points: &[Point3<f64>]) -> Point3<f64> {
        let (cols, values) = self.row(i);
        let sum = cols
            .iter()
            .zip(values)
            .fold(Vector3::zeros(), |acc, (&j, v)| acc + points[j].coords * *v);
        Point3::from(sum)
    }

    /// Compute `alpha * self + beta * other` for matrices of the same shape.
    pub fn linear_combination(&self, alpha: f64, other: &Self, beta: f64) -> Result<Self> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(MeshError::LengthMismatch {
                expected: self.rows * self.cols,
                actual: other.rows * other.cols,
            });
        }
        let mut triplets = Vec::with_capacity(self.nnz() + other.nnz());
        for (m, scale) in [(self, alpha), (other, beta)] {
            for i in 0..m.rows {
                let (cols, values) = m.row(i);
                triplets.extend(cols.iter().zip(values).map(|(&j, &v)| (i, j, scale * v)));
            }
        }
        Self::from_triplets(self.rows, self.cols, triplets)
    }

    fn check_cols(&self, len: usize) -> Result<()> {
        if len == self.cols {
            Ok(())
        } else {
            Err(MeshError::LengthMismatch {
                expected: self.cols,
                actual: len,
            })
        }
    }
}

/// Solve A*x = b with Gauss-Seidel iteration.
///
/// Converges for strictly diagonally dominant `A`, which is what implicit
/// Laplacian steps produce.
///
/// # Arguments
///
/// * `a` - The square system matrix
/// * `b` - The right-hand side vector
/// * `x0` - Optional initial guess (`b` if None)
/// * `max_iter` - Maximum number of sweeps
/// * `tolerance` - Convergence tolerance on the relative residual norm
///
/// # Errors
///
/// [`MeshError::ConvergenceFailed`] if the tolerance is not reached,
/// [`MeshError::LengthMismatch`] on dimension mismatch and
/// [`MeshError::InvalidParameter`] for a zero diagonal entry.
pub fn gauss_seidel(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(MeshError::LengthMismatch {
            expected: a.nrows(),
            actual: n,
        });
    }

    let diagonal: Vec<f64> = (0..n).map(|i| a.get(i, i)).collect();
    if let Some(i) = diagonal.iter().position(|&d| d == 0.0) {
        return Err(MeshError::invalid_param(
            "a",
            format!("row {i}"),
            "zero diagonal entry",
        ));
    }

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => b.clone(),
    };

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return Ok(DVector::zeros(n));
    }

    for _iter in 0..max_iter {
        for i in 0..n {
            let (cols, values) = a.row(i);
            let off_diagonal: f64 = cols
                .iter()
                .zip(values)
                .filter(|&(&j, _)| j != i)
                .map(|(&j, v)| v * x[j])
                .sum();
            x[i] = (b[i] - off_diagonal) / diagonal[i];
        }

        let residual = a.mul_vec(&x)? - b;
        if residual.norm() / b_norm < tolerance {
            return Ok(x);
        }
    }

    Err(MeshError::ConvergenceFailed {
        iterations: max_iter,
    })
}
