//! Symmetric `LDL^T` factorization with diagonal pivoting.
//!
//! The factorization of a symmetric matrix `A` is computed as `P A P^T = L D L^T`
//! where `P` is a permutation (stored as a sequence of row transpositions), `L` is
//! unit lower triangular and `D` diagonal. At each step the remaining diagonal
//! entry of largest magnitude is chosen as pivot which makes the decomposition
//! robust for positive (or negative) semi-definite matrices, as covariance
//! matrices are, and for symmetric indefinite matrices with non vanishing pivots.

use crate::errors::{GprError, Result};
use linfa_linalg::triangular::*;
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use ndarray_stats::QuantileExt;

/// Pivoted `LDL^T` decomposition of a symmetric matrix used to solve linear systems
#[derive(Clone, Debug)]
pub struct Ldlt {
    /// Unit lower triangular factor
    l: Array2<f64>,
    /// Diagonal factor
    d: Array1<f64>,
    /// Row k was swapped with row transpositions\[k\] at step k
    transpositions: Vec<usize>,
}

impl Ldlt {
    /// Factorize the symmetric matrix `a`, only its lower triangle is read.
    ///
    /// Fails with [`GprError::NumericalInstability`] when a pivot is not finite or
    /// negligible wrt the magnitude of the diagonal of `a` (singular matrix).
    pub fn new(a: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(GprError::DimensionMismatch(format!(
                "LDLT factorization requires a square matrix, got {:?}",
                a.dim()
            )));
        }
        let mut m = a.to_owned();
        // mirror the lower triangle
        for i in 0..n {
            for j in (i + 1)..n {
                m[[i, j]] = m[[j, i]];
            }
        }
        let scale = m.diag().fold(0., |acc: f64, v| acc.max(v.abs()));
        let tolerance = n as f64 * f64::EPSILON * scale;

        let mut transpositions = Vec::with_capacity(n);
        for k in 0..n {
            let p = k + m
                .diag()
                .slice(s![k..])
                .mapv(f64::abs)
                .argmax()
                .map_err(|_| {
                    GprError::NumericalInstability(format!(
                        "undefined pivot at step {k}, matrix contains NaN values"
                    ))
                })?;
            transpositions.push(p);
            if p != k {
                for j in 0..n {
                    m.swap([k, j], [p, j]);
                }
                for i in 0..n {
                    m.swap([i, k], [i, p]);
                }
            }

            let pivot = m[[k, k]];
            if !pivot.is_finite() || pivot.abs() <= tolerance {
                return Err(GprError::NumericalInstability(format!(
                    "singular matrix, pivot {pivot:e} at step {k} is below tolerance {tolerance:e}"
                )));
            }

            // Schur complement of the trailing block
            let col = m.slice(s![k + 1.., k]).to_owned();
            Zip::from(m.slice_mut(s![k + 1.., k + 1..]).rows_mut())
                .and(&col)
                .for_each(|mut row, &ci| {
                    row.zip_mut_with(&col, |v, &cj| *v -= ci * cj / pivot);
                });
            m.slice_mut(s![k + 1.., k]).mapv_inplace(|v| v / pivot);
        }

        let d = m.diag().to_owned();
        let mut l = Array2::eye(n);
        for i in 0..n {
            for j in 0..i {
                l[[i, j]] = m[[i, j]];
            }
        }
        Ok(Ldlt {
            l,
            d,
            transpositions,
        })
    }

    /// Size of the factorized matrix
    pub fn len(&self) -> usize {
        self.d.len()
    }

    /// Whether the factorized matrix is empty
    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }

    /// Unit lower triangular factor `L`
    pub fn l(&self) -> &Array2<f64> {
        &self.l
    }

    /// Diagonal factor `D` as a vector
    pub fn d(&self) -> &Array1<f64> {
        &self.d
    }

    /// Solve `A X = B` for the (n, m) right hand side `b`.
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let n = self.len();
        if b.nrows() != n {
            return Err(GprError::DimensionMismatch(format!(
                "right hand side should have {n} rows, got {}",
                b.nrows()
            )));
        }
        let mut x = b.to_owned();
        if n == 0 {
            return Ok(x);
        }

        for (k, &p) in self.transpositions.iter().enumerate() {
            swap_rows(&mut x, k, p);
        }
        let mut z = self.l.solve_triangular_into(x, UPLO::Lower)?;
        Zip::from(z.rows_mut())
            .and(&self.d)
            .for_each(|mut row, &dk| row.mapv_inplace(|v| v / dk));
        let mut x = self.l.t().solve_triangular_into(z, UPLO::Upper)?;
        for (k, &p) in self.transpositions.iter().enumerate().rev() {
            swap_rows(&mut x, k, p);
        }

        if x.iter().any(|v| !v.is_finite()) {
            return Err(GprError::NumericalInstability(
                "linear solve produced non finite values".to_string(),
            ));
        }
        Ok(x)
    }

    /// Solve `A x = b` for the (n,) vector `b`.
    pub fn solve_vec(&self, b: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array1<f64>> {
        let x = self.solve(&b.to_owned().insert_axis(Axis(1)))?;
        Ok(x.remove_axis(Axis(1)))
    }
}

fn swap_rows(x: &mut Array2<f64>, i: usize, j: usize) {
    if i != j {
        for c in 0..x.ncols() {
            x.swap([i, c], [j, c]);
        }
    }
}
