//! Capability traits shared by every probability distribution in the crate.
//!
//! Mixtures and emission models are generic over these capabilities rather
//! than over a distribution class hierarchy. A distribution is anything that
//! can report a density, a log-density, and refit itself from weighted
//! observations; composition supplies everything else.

use crate::errors::ModelResult;

/// A fittable probability distribution.
///
/// `Observation` is the sample type (`f64` for univariate distributions,
/// `Vec<f64>` for multivariate ones). `Options` carries fitting knobs such as
/// regularization and is defaultable so callers without special needs pass
/// `&Default::default()`.
pub trait Distribution: Clone {
    /// Sample type this distribution is defined over.
    type Observation: Clone;
    /// Fitting options accepted by [`fit_weighted`](Self::fit_weighted).
    type Options: Clone + Default;

    /// Probability density (or mass) at `x`.
    fn density(&self, x: &Self::Observation) -> f64;

    /// Natural logarithm of the density at `x`.
    fn log_density(&self, x: &Self::Observation) -> f64;

    /// Re-estimates the parameters from weighted observations.
    ///
    /// Weights are relative masses (EM responsibilities in the common case)
    /// and need not sum to one. On error the distribution keeps its previous
    /// parameters.
    fn fit_weighted(
        &mut self,
        observations: &[Self::Observation],
        weights: &[f64],
        options: &Self::Options,
    ) -> ModelResult<()>;
}

/// Options for fitting Normal-family distributions.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalFitOptions {
    /// Constant added to the covariance diagonal when the estimated
    /// covariance is not positive definite. Zero disables the retry loop and
    /// turns a degenerate estimate into an error.
    pub regularization: f64,
    /// Estimate only the diagonal of the covariance matrix, forcing
    /// independence between dimensions.
    pub diagonal: bool,
}
