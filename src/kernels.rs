//! A module for the covariance kernel of the GP model.
//!
//! Only the squared exponential kernel is implemented:
//!
//! `k(x, x') = sigma_f^2 * exp( - |x - x'|^2 / (2 * l^2) )`
//!
//! where `sigma_f` is the signal standard deviation and `l` the length scale.

use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
use std::fmt;

/// Squared exponential covariance kernel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquaredExponentialKernel {
    sigma_f: f64,
    length_scale: f64,
}

impl Default for SquaredExponentialKernel {
    fn default() -> Self {
        SquaredExponentialKernel::new(1., 1.)
    }
}

impl SquaredExponentialKernel {
    /// Kernel constructor given the signal standard deviation and the length scale.
    /// Values are expected to be validated (see [`GprParams`](crate::GprParams)).
    pub fn new(sigma_f: f64, length_scale: f64) -> Self {
        SquaredExponentialKernel {
            sigma_f,
            length_scale,
        }
    }

    /// Signal standard deviation
    pub fn sigma_f(&self) -> f64 {
        self.sigma_f
    }

    /// Length scale
    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    /// Prior variance `sigma_f^2`, i.e. the covariance of any point with itself
    pub fn variance(&self) -> f64 {
        self.sigma_f * self.sigma_f
    }

    /// Covariance between two points `x1` and `x2` given as (nx,) vectors.
    ///
    /// *Panics* if `x1` and `x2` have not the same number of components
    pub fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> f64 {
        let d2 = Zip::from(x1)
            .and(x2)
            .fold(0., |acc, a, b| acc + (a - b) * (a - b));
        let l2 = self.length_scale * self.length_scale;
        self.variance() * f64::exp(-0.5 * d2 / l2)
    }

    /// Covariances between each of the n points `xs` given as a (n, nx) matrix
    /// and the point `x` given as a (nx,) vector.
    /// Returns a (n,) vector.
    pub fn vector(
        &self,
        xs: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        xs.rows().into_iter().map(|xi| self.value(&xi, x)).collect()
    }

    /// Covariance matrix of the n points `xs` given as a (n, nx) matrix.
    /// Returns a symmetric (n, n) matrix.
    pub fn matrix(&self, xs: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        let n = xs.nrows();
        let mut k = Array2::zeros((n, n));
        // symmetric: evaluate the upper triangle and mirror it
        for i in 0..n {
            k[[i, i]] = self.variance();
            let xi = xs.row(i);
            for j in (i + 1)..n {
                let v = self.value(&xi, &xs.row(j));
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
        }
        k
    }
}

impl fmt::Display for SquaredExponentialKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SquaredExponential(sigma_f={}, length_scale={})",
            self.sigma_f, self.length_scale
        )
    }
}
