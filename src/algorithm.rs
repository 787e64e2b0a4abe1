use crate::errors::{GprError, Result};
use crate::kernels::SquaredExponentialKernel;
use crate::ldlt::Ldlt;
use crate::parameters::{GprParams, GprValidParams};
use crate::training_data::TrainingData;

use linfa::prelude::{DatasetBase, Fit};
use linfa::ParamGuard;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Dimension, Ix1, Ix2};

use log::{debug, warn};
use std::fmt;
use std::time::Instant;

/// Whether the cached factorization reflects the current training data and hyperparameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreparationState {
    /// Cache has to be recomputed before the next prediction
    Stale,
    /// Cache is up to date
    Fresh,
}

/// Quantities computed from the training data during preparation
/// used later on in prediction computations
#[derive(Clone, Debug)]
pub(crate) struct PreparedRegression {
    /// Factorization of the regularized covariance matrix `K + sigma_n^2 I`
    factorization: Ldlt,
    /// Solution of `(K + sigma_n^2 I) alpha = Y`, (n, output_dim)
    alpha: Array2<f64>,
}

impl PreparedRegression {
    fn new(
        data: &TrainingData,
        kernel: &SquaredExponentialKernel,
        noise_variance: f64,
    ) -> Result<Self> {
        let mut kxx = kernel.matrix(&data.inputs());
        kxx.diag_mut().mapv_inplace(|v| v + noise_variance);
        let factorization = Ldlt::new(&kxx)?;
        // every output column solved at once
        let alpha = factorization.solve(&data.outputs())?;
        Ok(PreparedRegression {
            factorization,
            alpha,
        })
    }
}

/// Lazily recomputed factorization and solve coefficients
#[derive(Clone, Debug)]
struct RegressionCache {
    state: PreparationState,
    prepared: Option<PreparedRegression>,
}

impl Default for RegressionCache {
    fn default() -> Self {
        RegressionCache {
            state: PreparationState::Stale,
            prepared: None,
        }
    }
}

impl RegressionCache {
    fn invalidate(&mut self) {
        self.state = PreparationState::Stale;
    }

    fn reset(&mut self) {
        self.state = PreparationState::Stale;
        self.prepared = None;
    }

    /// Recompute when stale or forced, otherwise reuse the cached preparation.
    /// On failure the previous preparation is kept and the state stays stale.
    fn prepare(
        &mut self,
        data: &TrainingData,
        kernel: &SquaredExponentialKernel,
        noise_variance: f64,
        force: bool,
    ) -> Result<&PreparedRegression> {
        let up_to_date = self.state == PreparationState::Fresh && !force;
        let prepared = match self.prepared.take() {
            Some(prepared) if up_to_date => {
                debug!("regression up to date, cached factorization reused");
                prepared
            }
            previous => {
                let now = Instant::now();
                match PreparedRegression::new(data, kernel, noise_variance) {
                    Ok(prepared) => {
                        debug!(
                            "regression prepared with {} samples in {:?} µs",
                            data.len(),
                            now.elapsed().as_micros()
                        );
                        self.state = PreparationState::Fresh;
                        prepared
                    }
                    Err(err) => {
                        warn!("regression preparation failed: {err}");
                        self.prepared = previous;
                        return Err(err);
                    }
                }
            }
        };
        Ok(&*self.prepared.insert(prepared))
    }
}

/// A structured copy of the training data
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSnapshot {
    /// Training inputs (n, input_dim)
    pub inputs: Array2<f64>,
    /// Training outputs (n, output_dim)
    pub outputs: Array2<f64>,
}

/// An online GP regression model with vector valued outputs where training
/// samples are added incrementally.
///
/// Each output component `y_i` is modeled as a zero mean gaussian process
/// sharing the squared exponential covariance
///
/// `k(x, x') = sigma_f^2 * exp( - |x - x'|^2 / (2 * l^2) )`
///
/// and observed with a gaussian noise of variance `sigma_n^2`.
///
/// # Implementation
///
/// * Training data are stored in growing buffers, adding a sample is amortized O(1).
/// * The regularized covariance matrix `K + sigma_n^2 I` is factorized with a
///   pivoted `LDL^T` decomposition and never inverted. The factorization is
///   computed lazily on the first prediction following a change of the training
///   data or hyperparameters (O(n^3)), or explicitly with [`prepare_regression`].
/// * Mean prediction is then O(n), variance prediction requires two triangular solves.
/// * The model is not synchronized, predictions take `&mut self` as they may prepare.
///
/// [`prepare_regression`]: OnlineGaussianProcess::prepare_regression
///
/// # Example
///
/// ```
/// use rover_gpr::OnlineGaussianProcess;
/// use ndarray::array;
///
/// let mut gp = OnlineGaussianProcess::new(1, 1).expect("GP created");
/// gp.add_training_data(&array![0.], &array![0.]).expect("sample added");
/// gp.add_training_data(&array![1.], &array![1.]).expect("sample added");
///
/// let mean = gp.predict_mean(&array![0.5]).expect("GP prediction");
/// let (_, variance) = gp.predict_mean_and_variance(&array![0.5]).expect("GP prediction");
/// assert!((mean[0] - 0.5).abs() < 0.1);
/// assert!(variance > 0. && variance < 1.);
/// ```
#[derive(Clone, Debug)]
pub struct OnlineGaussianProcess {
    /// Hyperparameters used to build the covariance matrix
    params: GprValidParams,
    /// Covariance kernel
    kernel: SquaredExponentialKernel,
    /// Training dataset (input, output)
    training_data: TrainingData,
    /// Factorization and weights computed from training data
    cache: RegressionCache,
}

impl fmt::Display for OnlineGaussianProcess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (input_dim, output_dim) = self.dims();
        write!(
            f,
            "OnlineGP(kernel={}, sigma_n={}, dims=({}, {}), n_data={})",
            self.kernel,
            self.params.sigma_n(),
            input_dim,
            output_dim,
            self.training_data.len(),
        )
    }
}

impl OnlineGaussianProcess {
    /// GP parameters constructor
    pub fn params() -> GprParams {
        GprParams::new()
    }

    /// Create an empty model for `input_dim` inputs and `output_dim` outputs
    /// with default hyperparameters.
    pub fn new(input_dim: usize, output_dim: usize) -> Result<Self> {
        Self::with_params(input_dim, output_dim, GprParams::default())
    }

    /// Create an empty model for `input_dim` inputs and `output_dim` outputs
    /// with given hyperparameters.
    pub fn with_params(input_dim: usize, output_dim: usize, params: GprParams) -> Result<Self> {
        let params = params.check()?;
        Ok(OnlineGaussianProcess {
            params,
            kernel: params.kernel(),
            training_data: TrainingData::new(input_dim, output_dim)?,
            cache: RegressionCache::default(),
        })
    }

    /// Add one training sample
    pub fn add_training_data(
        &mut self,
        input: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        output: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        self.training_data.push(input, output)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Add training samples given as (m, input_dim) inputs and (m, output_dim) outputs.
    /// Either all samples are added or none.
    pub fn add_training_data_batch(
        &mut self,
        inputs: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        outputs: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()> {
        self.training_data.append(inputs, outputs)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Remove all training samples, dimensions are kept
    pub fn clear_training_data(&mut self) {
        self.training_data.clear();
        self.cache.reset();
    }

    /// Set hyperparameters, invalid values are rejected and the model left unchanged
    pub fn set_hyperparameters(&mut self, params: GprParams) -> Result<()> {
        let params = params.check()?;
        if params != self.params {
            self.params = params;
            self.kernel = params.kernel();
            self.cache.invalidate();
        }
        Ok(())
    }

    /// Compute the factorization of the covariance matrix and the regression
    /// weights if training data changed since last preparation or when `force` is set.
    pub fn prepare_regression(&mut self, force: bool) -> Result<()> {
        self.cache.prepare(
            &self.training_data,
            &self.kernel,
            self.params.noise_variance(),
            force,
        )?;
        Ok(())
    }

    /// Predict the output mean at the given `x` point specified as a (input_dim,) vector.
    /// Returns a (output_dim,) vector, zeros when no training data is available.
    ///
    /// Fails with [`GprError::DimensionMismatch`] when `x` has not `input_dim` components
    /// and with [`GprError::InvalidQuery`] when one of them is NaN or infinite,
    /// even when the model holds no training data.
    pub fn predict_mean(&mut self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array1<f64>> {
        self.check_query(x)?;
        let output_dim = self.training_data.dims().1;
        if self.training_data.is_empty() {
            return Ok(Array1::zeros(output_dim));
        }
        let kernel = self.kernel;
        let prepared = self.cache.prepare(
            &self.training_data,
            &kernel,
            self.params.noise_variance(),
            false,
        )?;
        let kx = kernel.vector(&self.training_data.inputs(), x);
        Ok(kx.dot(&prepared.alpha))
    }

    /// Predict both the output mean and the variance at the given `x` point specified
    /// as a (input_dim,) vector.
    /// Returns a (output_dim,) mean vector and the scalar variance shared by all outputs,
    /// (zeros, 0) when no training data is available.
    /// Queries are validated as for [`predict_mean`](OnlineGaussianProcess::predict_mean).
    pub fn predict_mean_and_variance(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(Array1<f64>, f64)> {
        self.check_query(x)?;
        let output_dim = self.training_data.dims().1;
        if self.training_data.is_empty() {
            return Ok((Array1::zeros(output_dim), 0.));
        }
        let kernel = self.kernel;
        let prepared = self.cache.prepare(
            &self.training_data,
            &kernel,
            self.params.noise_variance(),
            false,
        )?;
        let kx = kernel.vector(&self.training_data.inputs(), x);
        let mean = kx.dot(&prepared.alpha);
        let variance = posterior_variance(prepared, &kernel, &kx, x)?;
        Ok((mean, variance))
    }

    /// Predict output means at n given `x` points specified as a (n, input_dim) matrix.
    /// Returns a (n, output_dim) matrix.
    pub fn predict(&mut self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        Ok(self.predict_valvar(x)?.0)
    }

    /// Predict variances at n given `x` points specified as a (n, input_dim) matrix.
    /// Returns a (n,) vector.
    pub fn predict_var(&mut self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        Ok(self.predict_valvar(x)?.1)
    }

    /// Predict both output means and variances at n given `x` points specified as a
    /// (n, input_dim) matrix.
    /// Returns a (n, output_dim) matrix of means and a (n,) vector of variances.
    /// The whole batch is rejected when one of the points is not a valid query.
    pub fn predict_valvar(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array2<f64>, Array1<f64>)> {
        self.check_query(x)?;
        let output_dim = self.training_data.dims().1;
        let mut means = Array2::zeros((x.nrows(), output_dim));
        let mut variances = Array1::zeros(x.nrows());
        if self.training_data.is_empty() || x.nrows() == 0 {
            return Ok((means, variances));
        }
        let kernel = self.kernel;
        let prepared = self.cache.prepare(
            &self.training_data,
            &kernel,
            self.params.noise_variance(),
            false,
        )?;
        let xt = self.training_data.inputs();
        for ((mut mean, variance), xi) in means
            .rows_mut()
            .into_iter()
            .zip(variances.iter_mut())
            .zip(x.rows())
        {
            let kx = kernel.vector(&xt, &xi);
            mean.assign(&kx.dot(&prepared.alpha));
            *variance = posterior_variance(prepared, &kernel, &kx, &xi)?;
        }
        Ok((means, variances))
    }

    /// Query points are rows (or the single vector) of `x`
    fn check_query<D: Dimension>(&self, x: &ArrayBase<impl Data<Elem = f64>, D>) -> Result<()> {
        let input_dim = self.training_data.dims().0;
        let len = x.shape().last().copied().unwrap_or(0);
        if len != input_dim {
            return Err(GprError::DimensionMismatch(format!(
                "query point should have {input_dim} components, got {len}"
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(GprError::InvalidQuery(
                "query point components should be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy of the current training inputs and outputs
    pub fn debug_dump(&self) -> TrainingSnapshot {
        TrainingSnapshot {
            inputs: self.training_data.inputs().to_owned(),
            outputs: self.training_data.outputs().to_owned(),
        }
    }

    /// Training inputs as a (n, input_dim) view
    pub fn inputs(&self) -> ArrayView2<f64> {
        self.training_data.inputs()
    }

    /// Training outputs as a (n, output_dim) view
    pub fn outputs(&self) -> ArrayView2<f64> {
        self.training_data.outputs()
    }

    /// Number of training samples
    pub fn training_len(&self) -> usize {
        self.training_data.len()
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        self.training_data.dims()
    }

    /// Current hyperparameters
    pub fn hyperparameters(&self) -> &GprValidParams {
        &self.params
    }

    /// Covariance kernel
    pub fn kernel(&self) -> &SquaredExponentialKernel {
        &self.kernel
    }

    /// State of the cached factorization
    pub fn state(&self) -> PreparationState {
        self.cache.state
    }

    /// Whether predictions can be made without recomputing the factorization
    pub fn is_prepared(&self) -> bool {
        self.cache.state == PreparationState::Fresh
    }

    /// Regression weights `alpha` as a (n, output_dim) matrix if the model was prepared
    pub fn alpha(&self) -> Option<&Array2<f64>> {
        self.cache.prepared.as_ref().map(|p| &p.alpha)
    }
}

/// `k(x, x) - kx^T (K + sigma_n^2 I)^-1 kx` clamped to zero
fn posterior_variance(
    prepared: &PreparedRegression,
    kernel: &SquaredExponentialKernel,
    kx: &Array1<f64>,
    x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> Result<f64> {
    let prior_variance = kernel.value(x, x);
    let v = prepared.factorization.solve_vec(kx)?;
    let variance = prior_variance - kx.dot(&v);
    // Variance might be slightly negative depending on
    // machine precision: set to zero in that case
    if variance < 0. {
        if variance < -1e-6 * prior_variance {
            warn!("negative posterior variance {variance:e} clamped to zero");
        }
        return Ok(0.);
    }
    Ok(variance)
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, GprError> for GprValidParams {
    type Object = OnlineGaussianProcess;

    /// Build a model holding the dataset samples, (n, input_dim) records
    /// and (n, output_dim) targets, and prepare it for predictions
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets();
        let mut gp = OnlineGaussianProcess::with_params(
            x.ncols(),
            y.ncols(),
            GprParams::new_from_valid(self),
        )?;
        gp.add_training_data_batch(x, y)?;
        gp.prepare_regression(true)?;
        Ok(gp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne};
    use linfa::prelude::Dataset;
    use ndarray::{array, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn scenario_gp() -> OnlineGaussianProcess {
        let params = OnlineGaussianProcess::params()
            .sigma_f(1.)
            .length_scale(1.)
            .sigma_n(0.01);
        let mut gp = OnlineGaussianProcess::with_params(1, 1, params).expect("GP created");
        gp.add_training_data(&array![0.], &array![0.]).unwrap();
        gp.add_training_data(&array![1.], &array![1.]).unwrap();
        gp
    }

    #[test]
    fn test_empty_model_predictions() {
        let mut gp = OnlineGaussianProcess::new(2, 3).unwrap();
        for q in [array![0., 0.], array![-5., 12.], array![1e6, -1e6]] {
            assert_eq!(array![0., 0., 0.], gp.predict_mean(&q).unwrap());
            let (mean, var) = gp.predict_mean_and_variance(&q).unwrap();
            assert_eq!(array![0., 0., 0.], mean);
            assert_eq!(0., var);
        }
        let (means, vars) = gp.predict_valvar(&array![[0., 1.], [2., 3.]]).unwrap();
        assert_eq!(Array2::<f64>::zeros((2, 3)), means);
        assert_eq!(Array1::<f64>::zeros(2), vars);
        assert_eq!(PreparationState::Stale, gp.state());
    }

    #[test]
    fn test_bad_dimensions() {
        assert!(matches!(
            OnlineGaussianProcess::new(0, 1),
            Err(GprError::DimensionMismatch(_))
        ));
        let mut gp = OnlineGaussianProcess::new(2, 1).unwrap();
        assert!(matches!(
            gp.add_training_data(&array![1.], &array![1.]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.predict_mean(&array![1.]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.predict_mean_and_variance(&array![1., 2., 3.]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.predict(&array![[1.]]),
            Err(GprError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_non_finite_queries_rejected() {
        let mut gp = OnlineGaussianProcess::new(1, 1).unwrap();
        gp.add_training_data(&array![0.], &array![1.]).unwrap();
        gp.add_training_data(&array![1.], &array![2.]).unwrap();
        gp.prepare_regression(false).unwrap();

        for q in [array![f64::NAN], array![f64::INFINITY], array![f64::NEG_INFINITY]] {
            assert!(matches!(
                gp.predict_mean(&q),
                Err(GprError::InvalidQuery(_))
            ));
            assert!(matches!(
                gp.predict_mean_and_variance(&q),
                Err(GprError::InvalidQuery(_))
            ));
        }
        assert!(matches!(
            gp.predict_valvar(&array![[0.5], [f64::NAN]]),
            Err(GprError::InvalidQuery(_))
        ));
        assert!(matches!(
            gp.predict(&array![[f64::NAN]]),
            Err(GprError::InvalidQuery(_))
        ));
        // cached factorization is not affected
        assert_eq!(PreparationState::Fresh, gp.state());
        assert!(gp.predict_mean(&array![0.5]).unwrap()[0].is_finite());

        gp.clear_training_data();
        assert!(matches!(
            gp.predict_mean(&array![f64::NAN]),
            Err(GprError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_empty_model_checks_query_dimension() {
        let mut gp = OnlineGaussianProcess::new(2, 1).unwrap();
        assert!(matches!(
            gp.predict_mean(&array![1., 2., 3.]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert!(matches!(
            gp.predict_valvar(&array![[1.]]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert_eq!(array![0.], gp.predict_mean(&array![1., 2.]).unwrap());
    }

    #[test]
    fn test_scenario_midpoint() {
        let mut gp = scenario_gp();
        let mean = gp.predict_mean(&array![0.5]).unwrap();
        // smoothed by the kernel, exact value is 0.549
        assert_abs_diff_eq!(0.5, mean[0], epsilon = 0.06);
    }

    #[test]
    fn test_scenario_at_training_point() {
        let mut gp = scenario_gp();
        let (mean, var) = gp.predict_mean_and_variance(&array![0.]).unwrap();
        assert_abs_diff_eq!(0., mean[0], epsilon = 1e-3);
        // of the order of sigma_n^2
        assert!(var > 0.);
        assert!(var < 2e-4);
    }

    #[test]
    fn test_scenario_far_away() {
        let mut gp = scenario_gp();
        let (mean, var) = gp.predict_mean_and_variance(&array![100.]).unwrap();
        assert_abs_diff_eq!(0., mean[0], epsilon = 1e-12);
        assert_abs_diff_eq!(1., var, epsilon = 1e-12);
    }

    #[test]
    fn test_single_training_point() {
        let params = OnlineGaussianProcess::params().sigma_f(2.).sigma_n(0.);
        let mut gp = OnlineGaussianProcess::with_params(1, 2, params).unwrap();
        gp.add_training_data(&array![3.], &array![1., -2.]).unwrap();
        let (mean, var) = gp.predict_mean_and_variance(&array![3.]).unwrap();
        assert_abs_diff_eq!(array![1., -2.], mean, epsilon = 1e-12);
        assert_abs_diff_eq!(0., var, epsilon = 1e-12);
        // alpha = y / sigma_f^2
        assert_abs_diff_eq!(array![[0.25, -0.5]], *gp.alpha().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_variance_grows_with_distance() {
        let params = OnlineGaussianProcess::params().sigma_f(1.5).sigma_n(0.);
        let mut gp = OnlineGaussianProcess::with_params(1, 1, params).unwrap();
        gp.add_training_data_batch(&array![[0.], [1.], [2.]], &array![[0.], [1.], [0.]])
            .unwrap();
        let xs = Array::linspace(2., 12., 11).insert_axis(Axis(1));
        let vars = gp.predict_var(&xs).unwrap();
        assert_abs_diff_eq!(0., vars[0], epsilon = 1e-8);
        for w in vars.windows(2) {
            assert!(w[1] >= w[0]);
        }
        assert_abs_diff_eq!(1.5 * 1.5, vars[10], epsilon = 1e-8);
    }

    macro_rules! test_interpolation {
        ($dim:literal, $nt:literal) => {
            paste! {
                #[test]
                fn [<test_interpolation_ $dim d_ $nt>]() {
                    let params = OnlineGaussianProcess::params()
                        .length_scale(0.5)
                        .sigma_n(0.);
                    let mut gp = OnlineGaussianProcess::with_params($dim, 2, params).unwrap();
                    // well spread Kronecker sequence in [0, 3]^dim
                    let steps = array![2f64.sqrt(), 3f64.sqrt(), 5f64.sqrt()];
                    let xt = Array2::from_shape_fn(($nt, $dim), |(i, j)| {
                        3. * ((i + 1) as f64 * steps[j]).fract()
                    });
                    let mut rng = Xoshiro256Plus::seed_from_u64(42);
                    let yt = Array::random_using(($nt, 2), Uniform::new(-1., 1.), &mut rng);
                    for (x, y) in xt.rows().into_iter().zip(yt.rows()) {
                        gp.add_training_data(&x, &y).unwrap();
                    }
                    for (x, y) in xt.rows().into_iter().zip(yt.rows()) {
                        let (mean, var) = gp.predict_mean_and_variance(&x).unwrap();
                        assert_abs_diff_eq!(y, mean, epsilon = 1e-5);
                        assert_abs_diff_eq!(0., var, epsilon = 1e-6);
                    }
                    assert_abs_diff_eq!(yt, gp.predict(&xt).unwrap(), epsilon = 1e-5);
                }
            }
        };
    }

    test_interpolation!(1, 5);
    test_interpolation!(2, 10);
    test_interpolation!(3, 20);

    #[test]
    fn test_prepare_is_lazy() {
        let mut gp = scenario_gp();
        assert_eq!(PreparationState::Stale, gp.state());
        assert!(gp.alpha().is_none());

        gp.prepare_regression(false).unwrap();
        assert!(gp.is_prepared());
        let alpha = gp.alpha().unwrap().to_owned();
        let ptr = gp.alpha().unwrap().as_ptr();

        gp.prepare_regression(false).unwrap();
        assert_eq!(alpha, *gp.alpha().unwrap());
        // no recomputation, same buffer
        assert_eq!(ptr, gp.alpha().unwrap().as_ptr());

        gp.prepare_regression(true).unwrap();
        assert!(gp.is_prepared());
        assert_eq!(alpha, *gp.alpha().unwrap());
    }

    #[test]
    fn test_mutations_make_stale() {
        let mut gp = scenario_gp();
        gp.prepare_regression(false).unwrap();

        gp.add_training_data(&array![2.], &array![0.]).unwrap();
        assert_eq!(PreparationState::Stale, gp.state());
        gp.predict_mean(&array![0.5]).unwrap();
        assert_eq!(PreparationState::Fresh, gp.state());
        assert_eq!((3, 1), gp.alpha().unwrap().dim());

        gp.add_training_data_batch(&array![[3.]], &array![[1.]])
            .unwrap();
        assert_eq!(PreparationState::Stale, gp.state());
        gp.prepare_regression(false).unwrap();
        assert_eq!((4, 1), gp.alpha().unwrap().dim());

        gp.set_hyperparameters(GprParams::new().length_scale(2.))
            .unwrap();
        assert_eq!(PreparationState::Stale, gp.state());

        gp.clear_training_data();
        assert_eq!(PreparationState::Stale, gp.state());
        assert!(gp.alpha().is_none());
        assert_eq!(0, gp.training_len());
        assert_eq!((1, 1), gp.dims());
        assert_eq!(array![0.], gp.predict_mean(&array![0.5]).unwrap());
    }

    #[test]
    fn test_unchanged_hyperparameters_keep_cache() {
        let mut gp = scenario_gp();
        gp.prepare_regression(false).unwrap();
        let current = GprParams::new_from_valid(gp.hyperparameters());
        gp.set_hyperparameters(current).unwrap();
        assert!(gp.is_prepared());
    }

    #[test]
    fn test_invalid_hyperparameters_rejected() {
        let mut gp = scenario_gp();
        gp.prepare_regression(false).unwrap();
        let before = *gp.hyperparameters();
        assert!(matches!(
            gp.set_hyperparameters(GprParams::new().length_scale(-1.)),
            Err(GprError::InvalidHyperparameter(_))
        ));
        assert_eq!(before, *gp.hyperparameters());
        assert!(gp.is_prepared());
        assert!(matches!(
            OnlineGaussianProcess::with_params(1, 1, GprParams::new().sigma_f(0.)),
            Err(GprError::InvalidHyperparameter(_))
        ));
    }

    #[test]
    fn test_hyperparameters_change_predictions() {
        let mut gp = scenario_gp();
        let (_, var1) = gp.predict_mean_and_variance(&array![3.]).unwrap();
        gp.set_hyperparameters(GprParams::new().sigma_f(1.).length_scale(3.).sigma_n(0.01))
            .unwrap();
        let (_, var2) = gp.predict_mean_and_variance(&array![3.]).unwrap();
        assert_abs_diff_ne!(var1, var2, epsilon = 1e-3);
        assert!(var2 < var1);
    }

    #[test]
    fn test_duplicate_inputs_without_noise() {
        let params = OnlineGaussianProcess::params().sigma_n(0.);
        let mut gp = OnlineGaussianProcess::with_params(1, 1, params).unwrap();
        gp.add_training_data(&array![0.], &array![0.]).unwrap();
        gp.add_training_data(&array![0.], &array![1.]).unwrap();
        assert!(matches!(
            gp.prepare_regression(false),
            Err(GprError::NumericalInstability(_))
        ));
        assert_eq!(PreparationState::Stale, gp.state());
        // no valid cache: predictions report the failure
        assert!(matches!(
            gp.predict_mean(&array![0.5]),
            Err(GprError::NumericalInstability(_))
        ));
        assert!(matches!(
            gp.predict_mean_and_variance(&array![0.5]),
            Err(GprError::NumericalInstability(_))
        ));

        // noise regularizes the system
        gp.set_hyperparameters(GprParams::new().sigma_n(0.1))
            .unwrap();
        let mean = gp.predict_mean(&array![0.]).unwrap();
        assert_abs_diff_eq!(0.5, mean[0], epsilon = 0.01);
    }

    #[test]
    fn test_failed_preparation_keeps_previous_cache() {
        let params = OnlineGaussianProcess::params().sigma_n(0.);
        let mut gp = OnlineGaussianProcess::with_params(1, 1, params).unwrap();
        gp.add_training_data(&array![0.], &array![1.]).unwrap();
        gp.prepare_regression(false).unwrap();
        let alpha = gp.alpha().unwrap().to_owned();

        gp.add_training_data(&array![0.], &array![2.]).unwrap();
        assert!(gp.prepare_regression(false).is_err());
        assert_eq!(PreparationState::Stale, gp.state());
        assert_eq!(alpha, *gp.alpha().unwrap());
    }

    #[test]
    fn test_nan_training_data() {
        let mut gp = OnlineGaussianProcess::new(1, 1).unwrap();
        gp.add_training_data(&array![0.], &array![1.]).unwrap();
        gp.add_training_data(&array![f64::NAN], &array![1.])
            .unwrap();
        assert!(matches!(
            gp.predict_mean(&array![0.]),
            Err(GprError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_batch_matches_incremental() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let xt = Array::random_using((15, 2), Uniform::new(-1., 1.), &mut rng);
        let yt = xt.map_axis(Axis(1), |x| x[0] * x[1]).insert_axis(Axis(1));

        let mut batch = OnlineGaussianProcess::new(2, 1).unwrap();
        batch.add_training_data_batch(&xt, &yt).unwrap();
        let mut incremental = OnlineGaussianProcess::new(2, 1).unwrap();
        for (x, y) in xt.rows().into_iter().zip(yt.rows()) {
            incremental.add_training_data(&x, &y).unwrap();
        }
        assert_eq!(batch.debug_dump(), incremental.debug_dump());

        let xtest = Array::random_using((10, 2), Uniform::new(-1., 1.), &mut rng);
        let (m1, v1) = batch.predict_valvar(&xtest).unwrap();
        let (m2, v2) = incremental.predict_valvar(&xtest).unwrap();
        assert_abs_diff_eq!(m1, m2, epsilon = 1e-12);
        assert_abs_diff_eq!(v1, v2, epsilon = 1e-12);
    }

    #[test]
    fn test_batch_mismatch_leaves_model_unchanged() {
        let mut gp = scenario_gp();
        gp.prepare_regression(false).unwrap();
        let before = gp.debug_dump();
        assert!(matches!(
            gp.add_training_data_batch(&array![[2.], [3.]], &array![[1.]]),
            Err(GprError::DimensionMismatch(_))
        ));
        assert_eq!(before, gp.debug_dump());
        assert!(gp.is_prepared());
    }

    #[test]
    fn test_predictions_agree() {
        let mut gp = OnlineGaussianProcess::new(2, 2).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let xt = Array::random_using((12, 2), Uniform::new(0., 1.), &mut rng);
        let yt = Array::random_using((12, 2), Uniform::new(0., 1.), &mut rng);
        gp.add_training_data_batch(&xt, &yt).unwrap();

        let xtest = Array::random_using((5, 2), Uniform::new(0., 1.), &mut rng);
        let (means, vars) = gp.predict_valvar(&xtest).unwrap();
        assert_eq!(means, gp.predict(&xtest).unwrap());
        assert_eq!(vars, gp.predict_var(&xtest).unwrap());
        for (i, x) in xtest.rows().into_iter().enumerate() {
            let mean = gp.predict_mean(&x).unwrap();
            let (mean2, var) = gp.predict_mean_and_variance(&x).unwrap();
            assert_abs_diff_eq!(means.row(i), mean, epsilon = 1e-14);
            assert_abs_diff_eq!(mean, mean2, epsilon = 1e-14);
            assert_abs_diff_eq!(vars[i], var, epsilon = 1e-14);
            assert!(var >= 0.);
        }
    }

    #[test]
    fn test_debug_dump() {
        let mut gp = scenario_gp();
        let dump = gp.debug_dump();
        assert_eq!(array![[0.], [1.]], dump.inputs);
        assert_eq!(array![[0.], [1.]], dump.outputs);
        gp.clear_training_data();
        let dump = gp.debug_dump();
        assert_eq!((0, 1), dump.inputs.dim());
        assert_eq!((0, 1), dump.outputs.dim());
    }

    #[test]
    fn test_fit_dataset() {
        let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let yt = array![[0.0, 1.0], [1.0, 0.0], [1.5, -1.0], [0.9, 0.5], [1.0, 2.0]];
        let mut gp = OnlineGaussianProcess::params()
            .sigma_n(0.)
            .fit(&Dataset::new(xt.to_owned(), yt.to_owned()))
            .expect("GP fit error");
        assert!(gp.is_prepared());
        assert_eq!((1, 2), gp.dims());
        assert_abs_diff_eq!(yt, gp.predict(&xt).unwrap(), epsilon = 1e-8);

        // model keeps learning online
        gp.add_training_data(&array![5.], &array![0., 0.]).unwrap();
        assert_abs_diff_eq!(
            array![0., 0.],
            gp.predict_mean(&array![5.]).unwrap(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_fit_invalid_params() {
        let xt = array![[0.0], [1.0]];
        let yt = array![[0.0], [1.0]];
        let res = OnlineGaussianProcess::params()
            .length_scale(0.)
            .fit(&Dataset::new(xt, yt));
        assert!(matches!(res, Err(GprError::InvalidHyperparameter(_))));
    }

    #[test]
    fn test_display() {
        let gp = scenario_gp();
        assert_eq!(
            "OnlineGP(kernel=SquaredExponential(sigma_f=1, length_scale=1), sigma_n=0.01, dims=(1, 1), n_data=2)",
            gp.to_string()
        );
    }
}
