//! This library implements online [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! for vector valued outputs, used as an estimator of smooth functions (terrain cost, sensor calibration, ...)
//! whose training samples arrive one by one.
//!
//! Training samples are accumulated in an [OnlineGaussianProcess] and the regularized covariance
//! matrix of the training inputs is factorized lazily, only when a prediction is requested after
//! the training data changed. The complexity of this preparation is O(N^3) in processing time
//! and O(N^2) in memory where N is the number of training points, predictions are then cheap.
//!
//! The covariance is modeled with the [squared exponential kernel](kernels::SquaredExponentialKernel)
//! parameterized by [GprParams].
//!
//! # Example
//!
//! ```
//! use rover_gpr::{GprParams, OnlineGaussianProcess};
//! use ndarray::array;
//!
//! let params = GprParams::new().sigma_f(1.).length_scale(0.5).sigma_n(0.01);
//! let mut gp = OnlineGaussianProcess::with_params(2, 1, params).expect("GP created");
//!
//! gp.add_training_data(&array![0., 0.], &array![1.]).expect("sample added");
//! gp.add_training_data_batch(&array![[1., 0.], [0., 1.]], &array![[2.], [3.]])
//!     .expect("samples added");
//!
//! let (mean, variance) = gp
//!     .predict_mean_and_variance(&array![0.5, 0.5])
//!     .expect("GP prediction");
//! assert_eq!(1, mean.len());
//! assert!(variance >= 0.);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
pub mod kernels;
pub mod ldlt;
mod parameters;
mod training_data;

pub use algorithm::*;
pub use errors::*;
pub use parameters::*;
pub use training_data::TrainingData;
