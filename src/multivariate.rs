//! Multivariate Gaussian distribution backed by a Cholesky factorization.
//!
//! The density never forms an explicit inverse covariance. The quadratic
//! form is evaluated through the decomposition's solver, and the
//! log-normalization constant is computed once per parameter set from the
//! memoized log-determinant.

use log::warn;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::cholesky::CholeskyDecomposition;
use crate::distribution::{Distribution, NormalFitOptions};
use crate::errors::{
    ensure_rectangular, validate_all_finite, validate_lengths_match, validate_weights, ModelError,
    ModelResult,
};
use crate::matrix;
use crate::numeric::LN_TWO_PI;

/// Number of diagonal-loading attempts before a degenerate covariance is
/// reported as an error.
const MAX_REGULARIZATION_ATTEMPTS: usize = 100;

/// Multivariate Gaussian distribution.
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    mean: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    chol: CholeskyDecomposition,
    // -(k ln 2π + ln det Σ)/2
    ln_constant: f64,
}

impl MultivariateNormal {
    /// Creates a Gaussian with the given mean vector and covariance matrix.
    ///
    /// The covariance must be symmetric positive definite.
    pub fn new(mean: Vec<f64>, covariance: Vec<Vec<f64>>) -> ModelResult<Self> {
        validate_all_finite(&mean, "mean")?;
        let (rows, _) = ensure_rectangular(&covariance, "covariance")?;
        validate_lengths_match(mean.len(), rows, "mean versus covariance")?;
        crate::errors::validate_finite_matrix(&covariance, "covariance")?;

        let (chol, ln_constant) = factorize(&covariance, mean.len())?;
        Ok(Self {
            mean,
            covariance,
            chol,
            ln_constant,
        })
    }

    /// The standard Gaussian of the given dimension: zero mean, identity
    /// covariance.
    pub fn standard(dimension: usize) -> ModelResult<Self> {
        Self::new(vec![0.0; dimension], matrix::identity(dimension))
    }

    /// Estimates a Gaussian from unweighted observations using the sample
    /// covariance (`n - 1` divisor).
    pub fn estimate(observations: &[Vec<f64>], options: &NormalFitOptions) -> ModelResult<Self> {
        let (rows, cols) = ensure_rectangular(observations, "estimate")?;
        if rows < 2 {
            return Err(ModelError::InsufficientData {
                required: 2,
                actual: rows,
            });
        }

        let mean = matrix::column_mean(observations)?;
        let covariance = if options.diagonal {
            matrix::diagonal_matrix(&matrix::column_variance(observations)?)
        } else {
            matrix::covariance(observations)?
        };
        build_fitted(mean, covariance, cols, options)
    }

    /// Estimates a Gaussian from weighted observations (total-weight
    /// divisor).
    pub fn estimate_weighted(
        observations: &[Vec<f64>],
        weights: &[f64],
        options: &NormalFitOptions,
    ) -> ModelResult<Self> {
        let mut mvn = Self::standard(
            ensure_rectangular(observations, "estimate_weighted")?.1,
        )?;
        mvn.fit_weighted(observations, weights, options)?;
        Ok(mvn)
    }

    /// Distribution dimension.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Mean vector, exactly as constructed or fitted.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Covariance matrix, exactly as constructed or fitted.
    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    /// Quadratic form `(x-μ)ᵀ Σ⁻¹ (x-μ)` through the Cholesky solver.
    fn mahalanobis_squared(&self, x: &[f64]) -> ModelResult<f64> {
        validate_lengths_match(self.mean.len(), x.len(), "density argument")?;
        let z: Vec<f64> = x.iter().zip(&self.mean).map(|(&xi, &mi)| xi - mi).collect();
        let solved = self.chol.solve_vector(&z)?;
        matrix::inner_product(&z, &solved)
    }

    /// Draws `count` samples as `x = L·ε + μ` with standard normal `ε`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<Vec<f64>> {
        let k = self.mean.len();
        let l = self.chol.left_triangular();
        (0..count)
            .map(|_| {
                let eps: Vec<f64> = (0..k).map(|_| rng.sample(StandardNormal)).collect();
                (0..k)
                    .map(|i| {
                        let lx: f64 = (0..=i).map(|j| l[i][j] * eps[j]).sum();
                        lx + self.mean[i]
                    })
                    .collect()
            })
            .collect()
    }
}

impl Distribution for MultivariateNormal {
    type Observation = Vec<f64>;
    type Options = NormalFitOptions;

    /// Density at `x`, clamped to at most 1.
    ///
    /// The clamp mirrors the behavior models downstream were calibrated
    /// against; sharply peaked densities legitimately exceed 1 and are
    /// truncated here. Use [`log_density`](Distribution::log_density) for
    /// the unclamped value.
    fn density(&self, x: &Vec<f64>) -> f64 {
        match self.mahalanobis_squared(x) {
            Ok(b) => (self.ln_constant - 0.5 * b).exp().min(1.0),
            Err(_) => f64::NAN,
        }
    }

    fn log_density(&self, x: &Vec<f64>) -> f64 {
        match self.mahalanobis_squared(x) {
            Ok(b) => self.ln_constant - 0.5 * b,
            Err(_) => f64::NAN,
        }
    }

    fn fit_weighted(
        &mut self,
        observations: &[Vec<f64>],
        weights: &[f64],
        options: &NormalFitOptions,
    ) -> ModelResult<()> {
        let (rows, cols) = ensure_rectangular(observations, "fit")?;
        validate_lengths_match(self.mean.len(), cols, "fit observation dimension")?;
        validate_lengths_match(rows, weights.len(), "fit weights")?;
        validate_weights(weights, "fit weights")?;

        let mean = matrix::weighted_column_mean(observations, weights)?;
        let covariance = if options.diagonal {
            matrix::diagonal_matrix(&matrix::weighted_column_variance(observations, weights)?)
        } else {
            matrix::weighted_covariance(observations, weights)?
        };

        let fitted = build_fitted(mean, covariance, cols, options)?;
        *self = fitted;
        Ok(())
    }
}

/// Factorizes a covariance and derives the log-normalization constant.
fn factorize(covariance: &[Vec<f64>], k: usize) -> ModelResult<(CholeskyDecomposition, f64)> {
    let chol = CholeskyDecomposition::new(covariance)?;
    if !chol.is_symmetric() {
        return Err(ModelError::NonSymmetricMatrix {
            operation: "covariance factorization".to_string(),
        });
    }
    if !chol.is_positive_definite() {
        return Err(ModelError::NonPositiveDefiniteMatrix {
            operation: "covariance factorization".to_string(),
        });
    }
    let logdet = chol.log_determinant()?;
    let ln_constant = -0.5 * (k as f64 * LN_TWO_PI + logdet);
    Ok((chol, ln_constant))
}

/// Builds a distribution from estimated moments, loading the covariance
/// diagonal when the estimate is degenerate and regularization is enabled.
fn build_fitted(
    mean: Vec<f64>,
    mut covariance: Vec<Vec<f64>>,
    k: usize,
    options: &NormalFitOptions,
) -> ModelResult<MultivariateNormal> {
    let mut attempt = 0;
    loop {
        match factorize(&covariance, k) {
            Ok((chol, ln_constant)) => {
                return Ok(MultivariateNormal {
                    mean,
                    covariance,
                    chol,
                    ln_constant,
                });
            }
            Err(err @ ModelError::NonPositiveDefiniteMatrix { .. }) => {
                if options.regularization <= 0.0 {
                    return Err(err);
                }
                attempt += 1;
                if attempt > MAX_REGULARIZATION_ATTEMPTS {
                    return Err(ModelError::ConvergenceFailure {
                        reason: format!(
                            "covariance stayed degenerate after {} regularization attempts \
                             (regularization = {})",
                            MAX_REGULARIZATION_ATTEMPTS, options.regularization
                        ),
                    });
                }
                warn!(
                    "estimated covariance not positive definite; adding {} to the diagonal \
                     (attempt {})",
                    options.regularization, attempt
                );
                for (i, row) in covariance.iter_mut().enumerate() {
                    for v in row.iter_mut() {
                        if !v.is_finite() {
                            *v = 0.0;
                        }
                    }
                    row[i] += options.regularization;
                }
            }
            Err(err) => return Err(err),
        }
    }
}
