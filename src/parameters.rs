use crate::errors::{GprError, Result};
use crate::kernels::SquaredExponentialKernel;
use linfa::ParamGuard;

/// Default signal standard deviation
pub const GPR_DEFAULT_SIGMA_F: f64 = 1.0;
/// Default kernel length scale
pub const GPR_DEFAULT_LENGTH_SCALE: f64 = 1.0;
/// Default observation noise standard deviation
pub const GPR_DEFAULT_SIGMA_N: f64 = 0.01;

/// A set of validated GP hyperparameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GprValidParams {
    /// Signal standard deviation, the prior variance is `sigma_f^2`
    pub(crate) sigma_f: f64,
    /// Distance over which correlation between inputs decays
    pub(crate) length_scale: f64,
    /// Observation noise standard deviation, `sigma_n^2` is added to the
    /// diagonal of the training covariance matrix
    pub(crate) sigma_n: f64,
}

impl Default for GprValidParams {
    fn default() -> GprValidParams {
        GprValidParams {
            sigma_f: GPR_DEFAULT_SIGMA_F,
            length_scale: GPR_DEFAULT_LENGTH_SCALE,
            sigma_n: GPR_DEFAULT_SIGMA_N,
        }
    }
}

impl GprValidParams {
    /// Get signal standard deviation
    pub fn sigma_f(&self) -> f64 {
        self.sigma_f
    }

    /// Get kernel length scale
    pub fn length_scale(&self) -> f64 {
        self.length_scale
    }

    /// Get observation noise standard deviation
    pub fn sigma_n(&self) -> f64 {
        self.sigma_n
    }

    /// Noise variance added to the diagonal of the covariance matrix
    pub fn noise_variance(&self) -> f64 {
        self.sigma_n * self.sigma_n
    }

    /// Squared exponential kernel shaped by these hyperparameters
    pub fn kernel(&self) -> SquaredExponentialKernel {
        SquaredExponentialKernel::new(self.sigma_f, self.length_scale)
    }
}

#[derive(Clone, Debug, Default)]
/// The set of hyperparameters that can be specified for the execution of
/// the [online GP algorithm](crate::OnlineGaussianProcess).
pub struct GprParams(GprValidParams);

impl GprParams {
    /// A constructor for GP parameters set to default values
    pub fn new() -> GprParams {
        Self(GprValidParams::default())
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GprValidParams) -> Self {
        Self(*params)
    }

    /// Set signal standard deviation.
    ///
    /// Scales all covariances: the prior variance at any point is `sigma_f^2`.
    pub fn sigma_f(mut self, sigma_f: f64) -> Self {
        self.0.sigma_f = sigma_f;
        self
    }

    /// Set length scale.
    ///
    /// Controls how quickly correlation decays with the distance between inputs.
    pub fn length_scale(mut self, length_scale: f64) -> Self {
        self.0.length_scale = length_scale;
        self
    }

    /// Set observation noise standard deviation.
    ///
    /// Noise variance is added to the diagonal of the training covariance matrix
    /// before factorization which also stabilizes ill-conditioned systems.
    pub fn sigma_n(mut self, sigma_n: f64) -> Self {
        self.0.sigma_n = sigma_n;
        self
    }
}

impl From<GprValidParams> for GprParams {
    fn from(valid: GprValidParams) -> Self {
        GprParams(valid)
    }
}

impl ParamGuard for GprParams {
    type Checked = GprValidParams;
    type Error = GprError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        if !params.sigma_f.is_finite() || params.sigma_f <= 0. {
            return Err(GprError::InvalidHyperparameter(format!(
                "`sigma_f` should be strictly positive, got {}",
                params.sigma_f
            )));
        }
        if !params.length_scale.is_finite() || params.length_scale <= 0. {
            return Err(GprError::InvalidHyperparameter(format!(
                "`length_scale` should be strictly positive, got {}",
                params.length_scale
            )));
        }
        if !params.sigma_n.is_finite() || params.sigma_n < 0. {
            return Err(GprError::InvalidHyperparameter(format!(
                "`sigma_n` should be positive or zero, got {}",
                params.sigma_n
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
