//! Matrix and vector primitives shared by the live recursion and the
//! procedure evaluator.
//!
//! Products are accumulated as explicit ordered sums (inner index ascending,
//! accumulator starting at zero) rather than delegated to a BLAS-style kernel,
//! so that the exported procedure can transcribe exactly the same arithmetic.

use log::trace;

use super::{Matrix, Vector};
use crate::error::{Error, Result};

/// Determinant threshold below which a (scaled) matrix counts as singular.
pub const SINGULAR_TOLERANCE: f64 = 1e-10;

pub fn identity(n: usize) -> Matrix {
    Matrix::eye(n)
}

pub fn transpose(a: &Matrix) -> Matrix {
    a.t().to_owned()
}

pub fn add(a: &Matrix, b: &Matrix) -> Matrix {
    assert_eq!(a.dim(), b.dim(), "matrix sum dimension mismatch");
    Matrix::from_shape_fn(a.dim(), |(i, j)| a[[i, j]] + b[[i, j]])
}

pub fn subtract(a: &Matrix, b: &Matrix) -> Matrix {
    assert_eq!(a.dim(), b.dim(), "matrix difference dimension mismatch");
    Matrix::from_shape_fn(a.dim(), |(i, j)| a[[i, j]] - b[[i, j]])
}

pub fn add_vector(a: &Vector, b: &Vector) -> Vector {
    assert_eq!(a.len(), b.len(), "vector sum dimension mismatch");
    Vector::from_shape_fn(a.len(), |i| a[i] + b[i])
}

pub fn subtract_vector(a: &Vector, b: &Vector) -> Vector {
    assert_eq!(a.len(), b.len(), "vector difference dimension mismatch");
    Vector::from_shape_fn(a.len(), |i| a[i] - b[i])
}

/// Matrix product `a · b` as ordered sums over the inner dimension.
pub fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let (rows, inner) = a.dim();
    let (inner_b, cols) = b.dim();
    assert_eq!(inner, inner_b, "matrix product dimension mismatch");

    Matrix::from_shape_fn((rows, cols), |(i, j)| {
        let mut sum = 0.0;
        for k in 0..inner {
            sum += a[[i, k]] * b[[k, j]];
        }
        sum
    })
}

/// Matrix-vector product `a · x`, same summation order as [`multiply`]
/// with `x` taken as a single column.
pub fn multiply_vector(a: &Matrix, x: &Vector) -> Vector {
    let (rows, inner) = a.dim();
    assert_eq!(inner, x.len(), "matrix-vector product dimension mismatch");

    Vector::from_shape_fn(rows, |i| {
        let mut sum = 0.0;
        for k in 0..inner {
            sum += a[[i, k]] * x[k];
        }
        sum
    })
}

/// Inverse of a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Fails with [`Error::SingularMatrix`] when the matrix is all zeros or when
/// `|det M| < 1e-10 · max|m_ij|^n`. For a 2×2 matrix with entries of order one
/// this is the plain `|ad - bc| < 1e-10` test.
pub fn inverse(m: &Matrix) -> Result<Matrix> {
    let (n, cols) = m.dim();
    assert_eq!(n, cols, "only square matrices can be inverted");

    let scale = m.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Err(Error::SingularMatrix {
            step: None,
            determinant: 0.0,
        });
    }

    let mut work = m.clone();
    let mut result = identity(n);
    let mut determinant = 1.0;

    for column in 0..n {
        // Partial pivoting, first maximum wins
        let mut pivot_row = column;
        for row in column + 1..n {
            if work[[row, column]].abs() > work[[pivot_row, column]].abs() {
                pivot_row = row;
            }
        }

        if pivot_row != column {
            for j in 0..n {
                work.swap([column, j], [pivot_row, j]);
                result.swap([column, j], [pivot_row, j]);
            }
            determinant = -determinant;
        }

        let pivot = work[[column, column]];
        determinant *= pivot;
        if pivot == 0.0 {
            break;
        }

        for j in 0..n {
            work[[column, j]] /= pivot;
            result[[column, j]] /= pivot;
        }

        for row in 0..n {
            if row == column {
                continue;
            }
            let factor = work[[row, column]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[row, j]] -= factor * work[[column, j]];
                result[[row, j]] -= factor * result[[column, j]];
            }
        }
    }

    if determinant.abs() < SINGULAR_TOLERANCE * scale.powi(n as i32) {
        trace!("Rejecting inverse with determinant {determinant:e} at scale {scale:e}");
        return Err(Error::SingularMatrix {
            step: None,
            determinant,
        });
    }

    Ok(result)
}

pub fn is_symmetric(m: &Matrix, tolerance: f64) -> bool {
    let (rows, cols) = m.dim();
    if rows != cols {
        return false;
    }
    (0..rows).all(|i| (0..i).all(|j| (m[[i, j]] - m[[j, i]]).abs() <= tolerance))
}

/// Symmetric positive semi-definite test via LDLᵀ elimination.
///
/// Zero pivots are accepted as long as the rest of their column vanishes.
pub fn is_positive_semidefinite(m: &Matrix) -> bool {
    const TOLERANCE: f64 = 1e-12;

    if !is_symmetric(m, TOLERANCE) {
        return false;
    }

    let n = m.nrows();
    let scale = m.iter().fold(1.0_f64, |acc, value| acc.max(value.abs()));
    let tolerance = TOLERANCE * scale;
    let mut work = m.clone();

    for k in 0..n {
        let pivot = work[[k, k]];
        if pivot < -tolerance {
            return false;
        }
        if pivot <= tolerance {
            if (k + 1..n).any(|i| work[[i, k]].abs() > tolerance) {
                return false;
            }
            continue;
        }
        for i in k + 1..n {
            let factor = work[[i, k]] / pivot;
            for j in k + 1..n {
                work[[i, j]] -= factor * work[[k, j]];
            }
        }
    }

    true
}
