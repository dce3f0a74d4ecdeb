//! Dense linear algebra and probabilistic sequence modeling.
//!
//! The crate builds up from a small dense-matrix kernel and a Cholesky
//! decomposition to Gaussian distributions, finite mixtures fitted with
//! expectation-maximization, a K-Means-seeded Gaussian mixture model, and
//! hidden Markov models with scaled and log-space forward-backward
//! evaluation plus Baum-Welch learning for continuous emissions.
//!
//! # Example
//!
//! ```
//! use markov_mixtures::{DiscreteEmissions, HiddenMarkovModel};
//!
//! let emissions = DiscreteEmissions::new(vec![
//!     vec![0.9, 0.1],
//!     vec![0.2, 0.8],
//! ])?;
//! let model = HiddenMarkovModel::new(
//!     vec![vec![0.7, 0.3], vec![0.4, 0.6]],
//!     vec![0.6, 0.4],
//!     emissions,
//! )?;
//!
//! let log_likelihood = model.evaluate(&[0, 1, 0])?;
//! assert!(log_likelihood < 0.0);
//! # Ok::<(), markov_mixtures::ModelError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baum_welch;
pub mod cholesky;
pub mod distribution;
pub mod errors;
pub mod forward_backward;
pub mod gmm;
pub mod hmm;
pub mod kmeans;
pub mod matrix;
pub mod mixture;
pub mod multivariate;
pub mod numeric;
pub mod univariate;

pub use baum_welch::{BaumWelchLearning, BaumWelchOptions};
pub use cholesky::CholeskyDecomposition;
pub use distribution::{Distribution, NormalFitOptions};
pub use errors::{ModelError, ModelResult};
pub use gmm::{GaussianCluster, GaussianMixtureModel};
pub use hmm::{ContinuousEmissions, DiscreteEmissions, EmissionModel, HiddenMarkovModel};
pub use kmeans::{KMeans, KMeansResult};
pub use mixture::{Mixture, MixtureFitOptions};
pub use multivariate::MultivariateNormal;
pub use univariate::{Normal, Poisson};
