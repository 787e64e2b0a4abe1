use thiserror::Error;

/// A result type for online GP regression
pub type Result<T> = std::result::Result<T, GprError>;

/// An error when using [`OnlineGaussianProcess`](crate::OnlineGaussianProcess)
#[derive(Error, Debug)]
pub enum GprError {
    /// When given data or query shapes do not match the model dimensions
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When a query point has NaN or infinite components
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// When a hyperparameter value is out of its valid domain
    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),
    /// When the regularized covariance matrix cannot be factorized or solved
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
