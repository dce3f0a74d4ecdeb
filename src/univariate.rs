//! Univariate distributions: Normal and Poisson.

use statrs::function::gamma::ln_gamma;

use crate::distribution::{Distribution, NormalFitOptions};
use crate::errors::{
    validate_all_finite, validate_lengths_match, validate_weights, ModelError, ModelResult,
};
use crate::numeric::LN_TWO_PI;

/// Univariate Gaussian distribution.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Normal {
    mean: f64,
    variance: f64,
    // -(ln 2π + ln σ²)/2, recomputed whenever the variance changes.
    ln_constant: f64,
}

impl Normal {
    /// Creates a Gaussian with the given mean and variance.
    pub fn new(mean: f64, variance: f64) -> ModelResult<Self> {
        if !mean.is_finite() {
            return Err(ModelError::InvalidParameter {
                parameter: "mean".to_string(),
                value: mean,
                constraint: "must be finite".to_string(),
            });
        }
        if !(variance.is_finite() && variance > 0.0) {
            return Err(ModelError::InvalidParameter {
                parameter: "variance".to_string(),
                value: variance,
                constraint: "must be finite and positive".to_string(),
            });
        }
        Ok(Self {
            mean,
            variance,
            ln_constant: -0.5 * (LN_TWO_PI + variance.ln()),
        })
    }

    /// The standard normal, mean 0 and variance 1.
    pub fn standard() -> Self {
        Self {
            mean: 0.0,
            variance: 1.0,
            ln_constant: -0.5 * LN_TWO_PI,
        }
    }

    /// Distribution mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Distribution variance.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Distribution standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

impl Distribution for Normal {
    type Observation = f64;
    type Options = NormalFitOptions;

    fn density(&self, x: &f64) -> f64 {
        self.log_density(x).exp()
    }

    fn log_density(&self, x: &f64) -> f64 {
        let z = x - self.mean;
        self.ln_constant - 0.5 * z * z / self.variance
    }

    fn fit_weighted(
        &mut self,
        observations: &[f64],
        weights: &[f64],
        options: &NormalFitOptions,
    ) -> ModelResult<()> {
        if observations.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        validate_lengths_match(observations.len(), weights.len(), "normal fit weights")?;
        validate_all_finite(observations, "normal fit observations")?;
        validate_weights(weights, "normal fit weights")?;

        let total: f64 = weights.iter().sum();
        let mean: f64 = observations
            .iter()
            .zip(weights)
            .map(|(&x, &w)| w * x)
            .sum::<f64>()
            / total;

        // Population divisor: the weights already carry the effective counts.
        let mut variance: f64 = observations
            .iter()
            .zip(weights)
            .map(|(&x, &w)| {
                let d = x - mean;
                w * d * d
            })
            .sum::<f64>()
            / total;

        if !(variance > 0.0) {
            if options.regularization > 0.0 {
                variance = options.regularization;
            } else {
                return Err(ModelError::InvalidParameter {
                    parameter: "variance".to_string(),
                    value: variance,
                    constraint: "estimated variance must be positive; consider regularization"
                        .to_string(),
                });
            }
        }

        self.mean = mean;
        self.variance = variance;
        self.ln_constant = -0.5 * (LN_TWO_PI + variance.ln());
        Ok(())
    }
}

/// Poisson distribution over non-negative counts.
///
/// Observations are carried as `f64` so Poisson components compose with the
/// same fitting machinery as the continuous distributions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Poisson {
    lambda: f64,
}

impl Poisson {
    /// Creates a Poisson distribution with the given rate.
    pub fn new(lambda: f64) -> ModelResult<Self> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(ModelError::InvalidParameter {
                parameter: "lambda".to_string(),
                value: lambda,
                constraint: "must be finite and positive".to_string(),
            });
        }
        Ok(Self { lambda })
    }

    /// Rate parameter.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Distribution for Poisson {
    type Observation = f64;
    type Options = ();

    fn density(&self, x: &f64) -> f64 {
        self.log_density(x).exp()
    }

    fn log_density(&self, x: &f64) -> f64 {
        if *x < 0.0 {
            return f64::NEG_INFINITY;
        }
        x * self.lambda.ln() - self.lambda - ln_gamma(x + 1.0)
    }

    fn fit_weighted(
        &mut self,
        observations: &[f64],
        weights: &[f64],
        _options: &(),
    ) -> ModelResult<()> {
        if observations.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        validate_lengths_match(observations.len(), weights.len(), "poisson fit weights")?;
        validate_all_finite(observations, "poisson fit observations")?;
        validate_weights(weights, "poisson fit weights")?;

        let total: f64 = weights.iter().sum();
        let lambda = observations
            .iter()
            .zip(weights)
            .map(|(&x, &w)| w * x)
            .sum::<f64>()
            / total;

        if !(lambda > 0.0) {
            return Err(ModelError::InvalidParameter {
                parameter: "lambda".to_string(),
                value: lambda,
                constraint: "weighted mean must be positive".to_string(),
            });
        }

        self.lambda = lambda;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_normal_density() {
        let n = Normal::standard();
        // 1/sqrt(2π)
        assert!((n.density(&0.0) - 0.398_942_280_401_432_7).abs() < 1e-12);
        assert!((n.log_density(&0.0) - n.density(&0.0).ln()).abs() < 1e-12);
        // Symmetry.
        assert!((n.density(&1.3) - n.density(&-1.3)).abs() < 1e-15);
    }

    #[test]
    fn test_normal_rejects_bad_parameters() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Normal::new(f64::NAN, 1.0).is_err());
        assert!(Normal::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_normal_weighted_fit() {
        let mut n = Normal::standard();
        let obs = [0.0, 2.0, 4.0];
        let w = [1.0, 1.0, 1.0];
        n.fit_weighted(&obs, &w, &NormalFitOptions::default()).unwrap();
        assert!((n.mean() - 2.0).abs() < 1e-12);
        // Population variance of {0, 2, 4} is 8/3.
        assert!((n.variance() - 8.0 / 3.0).abs() < 1e-12);

        // Concentrated weight recovers the dominant observation.
        n.fit_weighted(&obs, &[0.0, 1.0, 0.0], &NormalFitOptions { regularization: 0.5, diagonal: false })
            .unwrap();
        assert!((n.mean() - 2.0).abs() < 1e-12);
        assert_eq!(n.variance(), 0.5);
    }

    #[test]
    fn test_normal_fit_degenerate_without_regularization() {
        let mut n = Normal::standard();
        let before = (n.mean(), n.variance());
        let err = n.fit_weighted(&[3.0, 3.0], &[1.0, 1.0], &NormalFitOptions::default());
        assert!(matches!(err, Err(ModelError::InvalidParameter { .. })));
        // Failed fits leave the parameters untouched.
        assert_eq!((n.mean(), n.variance()), before);
    }

    #[test]
    fn test_poisson_log_density() {
        let p = Poisson::new(1.5).unwrap();
        // P(K = 2) = e^{-1.5} 1.5² / 2!
        let expected = (-1.5_f64).exp() * 1.5 * 1.5 / 2.0;
        assert!((p.density(&2.0) - expected).abs() < 1e-12);
        assert_eq!(p.log_density(&-1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_poisson_fit_is_weighted_mean() {
        let mut p = Poisson::new(1.0).unwrap();
        p.fit_weighted(&[1.0, 2.0, 3.0], &[1.0, 2.0, 1.0], &()).unwrap();
        assert!((p.lambda() - 2.0).abs() < 1e-12);

        assert!(p.fit_weighted(&[0.0, 0.0], &[1.0, 1.0], &()).is_err());
    }
}
