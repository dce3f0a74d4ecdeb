//! Finite mixture of distributions with expectation-maximization fitting.
//!
//! The EM loop operates on cloned working state and only swaps the fitted
//! coefficients and components into the mixture after the whole fit
//! succeeds. A diverged or non-converged fit therefore leaves the mixture
//! exactly as it was before the call.

use log::{debug, warn};

use crate::distribution::Distribution;
use crate::errors::{
    validate_lengths_match, validate_weights, ModelError, ModelResult,
};
use crate::numeric::COEFFICIENT_SUM_TOLERANCE;

/// Options controlling the EM fit of a [`Mixture`].
#[derive(Debug, Clone)]
pub struct MixtureFitOptions<O> {
    /// Relative log-likelihood change below which the fit has converged.
    pub threshold: f64,
    /// Iteration cap; exceeding it is a [`ModelError::ConvergenceFailure`].
    pub max_iterations: usize,
    /// Options forwarded to each component's own fit.
    pub inner: O,
}

impl<O: Default> Default for MixtureFitOptions<O> {
    fn default() -> Self {
        Self {
            threshold: 1e-3,
            max_iterations: 100,
            inner: O::default(),
        }
    }
}

/// Finite mixture `p(x) = Σ_k π_k p_k(x)` over components of one
/// distribution type.
#[derive(Debug, Clone)]
pub struct Mixture<T: Distribution> {
    coefficients: Vec<f64>,
    components: Vec<T>,
}

impl<T: Distribution> Mixture<T> {
    /// Creates a mixture with uniform coefficients.
    pub fn new(components: Vec<T>) -> ModelResult<Self> {
        let k = components.len();
        if k == 0 {
            return Err(ModelError::DimensionMismatch {
                context: "mixture components".to_string(),
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self {
            coefficients: vec![1.0 / k as f64; k],
            components,
        })
    }

    /// Creates a mixture with explicit coefficients.
    ///
    /// Coefficients must be non-negative and sum to one.
    pub fn with_coefficients(coefficients: Vec<f64>, components: Vec<T>) -> ModelResult<Self> {
        if components.is_empty() {
            return Err(ModelError::DimensionMismatch {
                context: "mixture components".to_string(),
                expected: 1,
                actual: 0,
            });
        }
        validate_lengths_match(
            components.len(),
            coefficients.len(),
            "mixture coefficients",
        )?;
        validate_weights(&coefficients, "mixture coefficients")?;
        let total: f64 = coefficients.iter().sum();
        if (total - 1.0).abs() > COEFFICIENT_SUM_TOLERANCE {
            return Err(ModelError::InvalidParameter {
                parameter: "mixture coefficients".to_string(),
                value: total,
                constraint: "must sum to 1".to_string(),
            });
        }
        Ok(Self {
            coefficients,
            components,
        })
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Mixing coefficients.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Mixture components.
    pub fn components(&self) -> &[T] {
        &self.components
    }

    /// A single component.
    ///
    /// Panics when `k` is out of range.
    pub fn component(&self, k: usize) -> &T {
        &self.components[k]
    }

    /// The joint density of component `k` at `x`, `π_k · p_k(x)`.
    ///
    /// Panics when `k` is out of range.
    pub fn component_density(&self, k: usize, x: &T::Observation) -> f64 {
        self.coefficients[k] * self.components[k].density(x)
    }

    /// Weighted log-likelihood `Σ_i w_i ln p(x_i)` under the current
    /// parameters, skipping observations with zero weight or zero density.
    pub fn log_likelihood(&self, observations: &[T::Observation], weights: &[f64]) -> f64 {
        log_likelihood_of(&self.coefficients, &self.components, observations, weights)
    }

    /// Fits the mixture by EM, returning the final weighted log-likelihood.
    ///
    /// On any error the mixture retains its pre-fit parameters.
    pub fn fit(
        &mut self,
        observations: &[T::Observation],
        weights: &[f64],
        options: &MixtureFitOptions<T::Options>,
    ) -> ModelResult<f64> {
        let n = observations.len();
        if n == 0 {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        validate_lengths_match(n, weights.len(), "fit weights")?;
        validate_weights(weights, "fit weights")?;

        // Normalized weights make responsibility masses directly usable as
        // mixing coefficients.
        let total: f64 = weights.iter().sum();
        let weights: Vec<f64> = weights.iter().map(|&w| w / total).collect();

        let k = self.components.len();
        let mut pi = self.coefficients.clone();
        let mut pdf = self.components.clone();
        let mut gamma = vec![vec![0.0; n]; k];

        let mut likelihood = log_likelihood_of(&pi, &pdf, observations, &weights);

        for iteration in 0..options.max_iterations {
            // E-step: responsibilities, normalized per observation. A zero
            // normalizer leaves that observation's responsibilities at zero.
            for (c, resp) in gamma.iter_mut().enumerate() {
                for (i, x) in observations.iter().enumerate() {
                    resp[i] = pi[c] * pdf[c].density(x);
                }
            }
            for i in 0..n {
                let sum: f64 = gamma.iter().map(|resp| resp[i]).sum();
                if sum != 0.0 {
                    for resp in gamma.iter_mut() {
                        resp[i] /= sum;
                    }
                }
            }
            for resp in gamma.iter_mut() {
                for (r, &w) in resp.iter_mut().zip(&weights) {
                    *r *= w;
                }
            }

            // M-step: coefficients from responsibility masses, component
            // refit with responsibility-normalized weights. A component with
            // no mass keeps its parameters but loses its mixing weight;
            // normalizing over the total mass keeps the coefficients summing
            // to one.
            let masses: Vec<f64> = gamma.iter().map(|resp| resp.iter().sum()).collect();
            let total_mass: f64 = masses.iter().sum();
            for c in 0..k {
                if masses[c] == 0.0 {
                    warn!("mixture component {} received no responsibility mass; keeping its parameters", c);
                    continue;
                }
                let fit_weights: Vec<f64> =
                    gamma[c].iter().map(|&g| g / masses[c]).collect();
                pdf[c].fit_weighted(observations, &fit_weights, &options.inner)?;
            }
            if total_mass > 0.0 {
                for (p, &m) in pi.iter_mut().zip(&masses) {
                    *p = m / total_mass;
                }
            }

            let new_likelihood = log_likelihood_of(&pi, &pdf, observations, &weights);
            if new_likelihood.is_nan() || new_likelihood.is_infinite() {
                return Err(ModelError::ConvergenceFailure {
                    reason: format!(
                        "log-likelihood became non-finite at iteration {}",
                        iteration + 1
                    ),
                });
            }

            let change = (likelihood - new_likelihood).abs();
            debug!(
                "EM iteration {}: log-likelihood {} (change {})",
                iteration + 1,
                new_likelihood,
                change
            );
            let converged = change <= options.threshold * likelihood.abs();
            likelihood = new_likelihood;
            if converged {
                self.coefficients = pi;
                self.components = pdf;
                return Ok(likelihood);
            }
        }

        Err(ModelError::ConvergenceFailure {
            reason: format!("did not converge in {} iterations", options.max_iterations),
        })
    }
}

impl<T: Distribution> Distribution for Mixture<T> {
    type Observation = T::Observation;
    type Options = MixtureFitOptions<T::Options>;

    fn density(&self, x: &Self::Observation) -> f64 {
        self.coefficients
            .iter()
            .zip(&self.components)
            .map(|(&pi, comp)| pi * comp.density(x))
            .sum()
    }

    fn log_density(&self, x: &Self::Observation) -> f64 {
        self.density(x).ln()
    }

    fn fit_weighted(
        &mut self,
        observations: &[Self::Observation],
        weights: &[f64],
        options: &Self::Options,
    ) -> ModelResult<()> {
        self.fit(observations, weights, options).map(|_| ())
    }
}

fn log_likelihood_of<T: Distribution>(
    pi: &[f64],
    pdf: &[T],
    observations: &[T::Observation],
    weights: &[f64],
) -> f64 {
    let mut likelihood = 0.0;
    for (x, &w) in observations.iter().zip(weights) {
        if w == 0.0 {
            continue;
        }
        let density: f64 = pi
            .iter()
            .zip(pdf)
            .map(|(&p, comp)| p * comp.density(x))
            .sum();
        if density > 0.0 {
            likelihood += w * density.ln();
        }
    }
    likelihood
}
