//! Baum-Welch parameter learning for continuous-emission hidden Markov
//! models.
//!
//! The learner re-estimates initial probabilities, transitions and the
//! per-state emission distributions from one or more observation sequences.
//! All re-estimation happens on a working copy of the model; the caller's
//! model is replaced only after the fit converges, so a diverged or capped
//! run leaves it untouched.

use log::{debug, warn};

use crate::distribution::Distribution;
use crate::errors::{ModelError, ModelResult};
use crate::forward_backward;
use crate::hmm::{ContinuousEmissions, EmissionModel, HiddenMarkovModel};

/// Options controlling a Baum-Welch run.
#[derive(Debug, Clone)]
pub struct BaumWelchOptions<O> {
    /// Relative log-likelihood change below which learning has converged.
    pub tolerance: f64,
    /// Iteration cap; exceeding it is a [`ModelError::ConvergenceFailure`].
    pub max_iterations: usize,
    /// Options forwarded to each emission distribution's fit.
    pub fitting: O,
}

impl<O: Default> Default for BaumWelchOptions<O> {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 100,
            fitting: O::default(),
        }
    }
}

/// Baum-Welch learner for models with distribution-valued emissions.
#[derive(Clone)]
pub struct BaumWelchLearning<D: Distribution> {
    /// Run configuration.
    pub options: BaumWelchOptions<D::Options>,
}

impl<D: Distribution> Default for BaumWelchLearning<D> {
    fn default() -> Self {
        Self {
            options: BaumWelchOptions::default(),
        }
    }
}

impl<D: Distribution> BaumWelchLearning<D> {
    /// Creates a learner with the given options.
    pub fn new(options: BaumWelchOptions<D::Options>) -> Self {
        Self { options }
    }

    /// Fits the model to the observation sequences, returning the final
    /// summed log-likelihood.
    pub fn run(
        &self,
        model: &mut HiddenMarkovModel<ContinuousEmissions<D>>,
        sequences: &[Vec<D::Observation>],
    ) -> ModelResult<f64> {
        if sequences.is_empty() {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let mut working = model.clone();
        let n = working.states();
        let mut likelihood = f64::NEG_INFINITY;

        for iteration in 0..self.options.max_iterations {
            // E-step: per-sequence trellises, state posteriors and joint
            // transition posteriors.
            let mut gammas: Vec<Vec<Vec<f64>>> = Vec::with_capacity(sequences.len());
            let mut ksis: Vec<Vec<Vec<Vec<f64>>>> = Vec::with_capacity(sequences.len());
            let mut new_likelihood = 0.0;

            for sequence in sequences {
                let (fwd, scaling, ll) = forward_backward::forward(&working, sequence)?;
                let bwd = forward_backward::backward(&working, sequence, &scaling)?;
                new_likelihood += ll;

                gammas.push(compute_gamma(&fwd, &bwd));
                ksis.push(compute_ksi(&working, sequence, &fwd, &bwd, &scaling));
            }

            if new_likelihood.is_nan() || new_likelihood == f64::INFINITY {
                return Err(ModelError::ConvergenceFailure {
                    reason: format!(
                        "log-likelihood became non-finite at iteration {}",
                        iteration + 1
                    ),
                });
            }

            debug!(
                "Baum-Welch iteration {}: log-likelihood {}",
                iteration + 1,
                new_likelihood
            );

            if likelihood.is_finite()
                && (likelihood - new_likelihood).abs()
                    <= self.options.tolerance * likelihood.abs()
            {
                *model = working;
                return Ok(new_likelihood);
            }
            likelihood = new_likelihood;

            // M-step: initial probabilities from the first-step posteriors.
            let mut log_initial = vec![0.0; n];
            for (i, li) in log_initial.iter_mut().enumerate() {
                let mean: f64 = gammas.iter().map(|g| g[0][i]).sum::<f64>()
                    / sequences.len() as f64;
                *li = mean.ln();
            }

            // Transitions from expected transition counts.
            let mut log_transitions = working.log_transitions().to_vec();
            for k in 0..n {
                let mut den = 0.0;
                for (gamma, sequence) in gammas.iter().zip(sequences) {
                    for t in 0..sequence.len() - 1 {
                        den += gamma[t][k];
                    }
                }
                if den == 0.0 {
                    warn!("state {} has no expected occupancy; keeping its transition row", k);
                    continue;
                }
                for l in 0..n {
                    let mut num = 0.0;
                    for ksi in &ksis {
                        for step in ksi {
                            num += step[k][l];
                        }
                    }
                    log_transitions[k][l] = (num / den).ln();
                }
            }

            working.set_parameters(log_transitions, log_initial);

            // Emissions: pooled observations weighted by normalized state
            // posteriors.
            self.update_emissions(&mut working, sequences, &gammas)?;
        }

        Err(ModelError::ConvergenceFailure {
            reason: format!(
                "did not converge in {} iterations",
                self.options.max_iterations
            ),
        })
    }

    fn update_emissions(
        &self,
        working: &mut HiddenMarkovModel<ContinuousEmissions<D>>,
        sequences: &[Vec<D::Observation>],
        gammas: &[Vec<Vec<f64>>],
    ) -> ModelResult<()> {
        let n = working.states();
        let pooled: Vec<D::Observation> = sequences.iter().flatten().cloned().collect();

        for i in 0..n {
            let mut weights: Vec<f64> = Vec::with_capacity(pooled.len());
            for gamma in gammas {
                weights.extend(gamma.iter().map(|row| row[i]));
            }
            let total: f64 = weights.iter().sum();
            if total == 0.0 {
                warn!("state {} has no posterior mass; keeping its emission model", i);
                continue;
            }
            for w in &mut weights {
                *w /= total;
            }
            working.emissions_mut().distributions_mut()[i].fit_weighted(
                &pooled,
                &weights,
                &self.options.fitting,
            )?;
        }
        Ok(())
    }
}

fn compute_gamma(fwd: &[Vec<f64>], bwd: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut gamma = vec![vec![0.0; fwd[0].len()]; fwd.len()];
    for t in 0..fwd.len() {
        let mut sum = 0.0;
        for (g, (&f, &b)) in gamma[t].iter_mut().zip(fwd[t].iter().zip(&bwd[t])) {
            *g = f * b;
            sum += *g;
        }
        if sum != 0.0 {
            for g in &mut gamma[t] {
                *g /= sum;
            }
        }
    }
    gamma
}

fn compute_ksi<D: Distribution>(
    model: &HiddenMarkovModel<ContinuousEmissions<D>>,
    sequence: &[D::Observation],
    fwd: &[Vec<f64>],
    bwd: &[Vec<f64>],
    scaling: &[f64],
) -> Vec<Vec<Vec<f64>>> {
    let n = model.states();
    let t_len = sequence.len();
    let a = model.transitions();
    let emissions = model.emissions();

    let mut ksi = vec![vec![vec![0.0; n]; n]; t_len.saturating_sub(1)];
    for t in 0..t_len.saturating_sub(1) {
        let mut sum = 0.0;
        for k in 0..n {
            for l in 0..n {
                let value = scaling[t + 1]
                    * fwd[t][k]
                    * a[k][l]
                    * bwd[t + 1][l]
                    * emissions.density(l, &sequence[t + 1]);
                ksi[t][k][l] = value;
                sum += value;
            }
        }
        if sum != 0.0 {
            for row in &mut ksi[t] {
                for v in row.iter_mut() {
                    *v /= sum;
                }
            }
        }
    }
    ksi
}
