//! Gaussian mixture model estimation: K-Means seeding, EM refinement and
//! cluster classification.

use log::warn;
use rand::Rng;

use crate::distribution::NormalFitOptions;
use crate::errors::{ensure_rectangular, validate_lengths_match, ModelError, ModelResult};
use crate::kmeans::KMeans;
use crate::matrix;
use crate::mixture::{Mixture, MixtureFitOptions};
use crate::multivariate::MultivariateNormal;

/// A `k`-component Gaussian mixture estimated from data.
///
/// The model starts empty; [`initialize`](Self::initialize) seeds it with
/// K-Means and [`compute`](Self::compute) refines it with EM (seeding first
/// if needed).
#[derive(Debug, Clone)]
pub struct GaussianMixtureModel {
    k: usize,
    mixture: Option<Mixture<MultivariateNormal>>,
}

impl GaussianMixtureModel {
    /// Creates an unfitted model with `k` components.
    pub fn new(k: usize) -> ModelResult<Self> {
        if k == 0 {
            return Err(ModelError::InvalidParameter {
                parameter: "k".to_string(),
                value: 0.0,
                constraint: "must be at least 1".to_string(),
            });
        }
        Ok(Self { k, mixture: None })
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.k
    }

    /// The underlying mixture, if the model has been initialized or fitted.
    pub fn mixture(&self) -> Option<&Mixture<MultivariateNormal>> {
        self.mixture.as_ref()
    }

    fn require_mixture(&self) -> ModelResult<&Mixture<MultivariateNormal>> {
        self.mixture.as_ref().ok_or_else(|| ModelError::InvalidParameter {
            parameter: "model".to_string(),
            value: 0.0,
            constraint: "must be initialized or fitted before use".to_string(),
        })
    }

    /// Seeds the mixture from a K-Means clustering of the data.
    ///
    /// Each cluster contributes its centroid as a component mean and its
    /// empirical covariance as the component covariance. A cluster whose
    /// covariance is not positive definite falls back to the identity; the
    /// fallback is logged but not reported as an error.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        data: &[Vec<f64>],
        rng: &mut R,
    ) -> ModelResult<()> {
        let (_, cols) = ensure_rectangular(data, "gmm initialize")?;
        let clustering = KMeans::new(self.k).fit(data, rng)?;

        let mut components = Vec::with_capacity(self.k);
        for c in 0..self.k {
            let mean = clustering.centroids[c].clone();
            let covariance = clustering.covariances[c].clone();
            let component = match MultivariateNormal::new(mean.clone(), covariance) {
                Ok(mvn) => mvn,
                Err(ModelError::NonPositiveDefiniteMatrix { .. }) => {
                    warn!(
                        "cluster {} covariance is not positive definite; \
                         falling back to the identity",
                        c
                    );
                    MultivariateNormal::new(mean, matrix::identity(cols))?
                }
                Err(err) => return Err(err),
            };
            components.push(component);
        }

        self.mixture = Some(Mixture::with_coefficients(
            clustering.proportions,
            components,
        )?);
        Ok(())
    }

    /// Fits the mixture to the data by EM, seeding with K-Means when the
    /// model has not been initialized yet.
    ///
    /// Returns the final log-likelihood as the goodness of fit.
    pub fn compute<R: Rng + ?Sized>(
        &mut self,
        data: &[Vec<f64>],
        options: &MixtureFitOptions<NormalFitOptions>,
        rng: &mut R,
    ) -> ModelResult<f64> {
        if self.mixture.is_none() {
            self.initialize(data, rng)?;
        }
        let weights = vec![1.0; data.len()];
        match self.mixture.as_mut() {
            Some(mixture) => mixture.fit(data, &weights, options),
            None => unreachable!("initialize populates the mixture"),
        }
    }

    /// Most likely component for `x`: the argmax of `π_c · p_c(x)`, ties
    /// resolved toward the lowest index.
    pub fn classify(&self, x: &[f64]) -> ModelResult<usize> {
        Ok(self.classify_with_responses(x)?.0)
    }

    /// Classification together with the per-component joint densities.
    pub fn classify_with_responses(&self, x: &[f64]) -> ModelResult<(usize, Vec<f64>)> {
        let mixture = self.require_mixture()?;
        validate_lengths_match(
            mixture.component(0).dimension(),
            x.len(),
            "classification input",
        )?;
        let x = x.to_vec();
        let responses: Vec<f64> = (0..self.k)
            .map(|c| mixture.component_density(c, &x))
            .collect();

        let mut best = 0;
        for (c, &r) in responses.iter().enumerate() {
            if r > responses[best] {
                best = c;
            }
        }
        Ok((best, responses))
    }

    /// Read-only views over all components.
    pub fn clusters(&self) -> ModelResult<Vec<GaussianCluster<'_>>> {
        let mixture = self.require_mixture()?;
        Ok((0..self.k)
            .map(|index| GaussianCluster { mixture, index })
            .collect())
    }

    /// Read-only view over one component.
    pub fn cluster(&self, index: usize) -> ModelResult<GaussianCluster<'_>> {
        let mixture = self.require_mixture()?;
        if index >= self.k {
            return Err(ModelError::DimensionMismatch {
                context: "cluster index".to_string(),
                expected: self.k,
                actual: index,
            });
        }
        Ok(GaussianCluster { mixture, index })
    }
}

/// Borrowed view of one mixture component.
///
/// Every accessor reads through to the live mixture, so views never go
/// stale and never alias mutable model state.
#[derive(Debug, Clone, Copy)]
pub struct GaussianCluster<'a> {
    mixture: &'a Mixture<MultivariateNormal>,
    index: usize,
}

impl GaussianCluster<'_> {
    /// Component index within the mixture.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Component mean.
    pub fn mean(&self) -> &[f64] {
        self.mixture.component(self.index).mean()
    }

    /// Component covariance.
    pub fn covariance(&self) -> &[Vec<f64>] {
        self.mixture.component(self.index).covariance()
    }

    /// Mixing proportion of this component.
    pub fn proportion(&self) -> f64 {
        self.mixture.coefficients()[self.index]
    }

    /// Joint density `π_c · p_c(x)` of this component at `x`.
    pub fn density(&self, x: &[f64]) -> ModelResult<f64> {
        validate_lengths_match(
            self.mixture.component(self.index).dimension(),
            x.len(),
            "cluster density input",
        )?;
        Ok(self.mixture.component_density(self.index, &x.to_vec()))
    }
}
