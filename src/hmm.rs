//! Hidden Markov models over pluggable emission models.
//!
//! Transition and initial probabilities are accepted in linear space,
//! validated to be row-stochastic, and stored as logarithms. Emissions are
//! abstracted behind [`EmissionModel`] so the same chain machinery serves
//! discrete symbol alphabets and continuous distribution-valued states.

use crate::distribution::Distribution;
use crate::errors::{
    ensure_rectangular, validate_lengths_match, ModelError, ModelResult,
};
use crate::forward_backward;
use crate::numeric::ROW_SUM_TOLERANCE;

/// Per-state observation model of a hidden Markov chain.
pub trait EmissionModel: Clone {
    /// Observation type emitted by the states.
    type Observation: Clone;

    /// Number of hidden states.
    fn states(&self) -> usize;

    /// Emission density of `x` in the given state.
    fn density(&self, state: usize, x: &Self::Observation) -> f64;

    /// Log emission density of `x` in the given state.
    fn log_density(&self, state: usize, x: &Self::Observation) -> f64;

    /// Checks that an observation is representable by this model.
    ///
    /// The default accepts everything; discrete models bound-check symbols
    /// here so whole sequences can be rejected before any recursion runs.
    fn validate_observation(&self, _x: &Self::Observation) -> ModelResult<()> {
        Ok(())
    }
}

/// Discrete emissions over a finite symbol alphabet.
///
/// Stores the row-stochastic emission matrix as logarithms.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscreteEmissions {
    log_emissions: Vec<Vec<f64>>,
    symbols: usize,
}

impl DiscreteEmissions {
    /// Creates discrete emissions from a `states × symbols` probability
    /// matrix with rows summing to one.
    pub fn new(emissions: Vec<Vec<f64>>) -> ModelResult<Self> {
        let (_, symbols) = ensure_rectangular(&emissions, "emission matrix")?;
        validate_stochastic_rows(&emissions, "emission matrix")?;
        let log_emissions = emissions
            .iter()
            .map(|row| row.iter().map(|&p| p.ln()).collect())
            .collect();
        Ok(Self {
            log_emissions,
            symbols,
        })
    }

    /// Alphabet size.
    pub fn symbols(&self) -> usize {
        self.symbols
    }
}

impl EmissionModel for DiscreteEmissions {
    type Observation = usize;

    fn states(&self) -> usize {
        self.log_emissions.len()
    }

    fn density(&self, state: usize, x: &usize) -> f64 {
        self.log_density(state, x).exp()
    }

    fn log_density(&self, state: usize, x: &usize) -> f64 {
        if *x >= self.symbols {
            return f64::NEG_INFINITY;
        }
        self.log_emissions[state][*x]
    }

    fn validate_observation(&self, x: &usize) -> ModelResult<()> {
        if *x >= self.symbols {
            return Err(ModelError::InvalidParameter {
                parameter: "symbol".to_string(),
                value: *x as f64,
                constraint: format!("must be below the alphabet size {}", self.symbols),
            });
        }
        Ok(())
    }
}

/// Continuous emissions: one distribution per hidden state.
#[derive(Debug, Clone)]
pub struct ContinuousEmissions<D: Distribution> {
    distributions: Vec<D>,
}

impl<D: Distribution> ContinuousEmissions<D> {
    /// Creates continuous emissions from per-state distributions.
    pub fn new(distributions: Vec<D>) -> ModelResult<Self> {
        if distributions.is_empty() {
            return Err(ModelError::DimensionMismatch {
                context: "emission distributions".to_string(),
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self { distributions })
    }

    /// Per-state distributions.
    pub fn distributions(&self) -> &[D] {
        &self.distributions
    }

    pub(crate) fn distributions_mut(&mut self) -> &mut [D] {
        &mut self.distributions
    }
}

impl<D: Distribution> EmissionModel for ContinuousEmissions<D> {
    type Observation = D::Observation;

    fn states(&self) -> usize {
        self.distributions.len()
    }

    fn density(&self, state: usize, x: &Self::Observation) -> f64 {
        self.distributions[state].density(x)
    }

    fn log_density(&self, state: usize, x: &Self::Observation) -> f64 {
        self.distributions[state].log_density(x)
    }
}

/// Hidden Markov model with `N` states and emissions of type `E`.
#[derive(Debug, Clone)]
pub struct HiddenMarkovModel<E: EmissionModel> {
    states: usize,
    log_transitions: Vec<Vec<f64>>,
    log_initial: Vec<f64>,
    emissions: E,
}

impl<E: EmissionModel> HiddenMarkovModel<E> {
    /// Creates a model from linear-space transition and initial
    /// probabilities.
    ///
    /// The transition matrix must be `N × N` for `N = emissions.states()`
    /// with every row summing to one; the initial vector must sum to one.
    pub fn new(
        transitions: Vec<Vec<f64>>,
        initial: Vec<f64>,
        emissions: E,
    ) -> ModelResult<Self> {
        let states = emissions.states();
        let (rows, cols) = ensure_rectangular(&transitions, "transition matrix")?;
        validate_lengths_match(states, rows, "transition matrix rows")?;
        validate_lengths_match(states, cols, "transition matrix columns")?;
        validate_lengths_match(states, initial.len(), "initial probabilities")?;
        validate_stochastic_rows(&transitions, "transition matrix")?;
        validate_stochastic_rows(std::slice::from_ref(&initial), "initial probabilities")?;

        let log_transitions = transitions
            .iter()
            .map(|row| row.iter().map(|&p| p.ln()).collect())
            .collect();
        let log_initial = initial.iter().map(|&p| p.ln()).collect();

        Ok(Self {
            states,
            log_transitions,
            log_initial,
            emissions,
        })
    }

    /// Number of hidden states.
    pub fn states(&self) -> usize {
        self.states
    }

    /// Log-space transition matrix.
    pub fn log_transitions(&self) -> &[Vec<f64>] {
        &self.log_transitions
    }

    /// Log-space initial probabilities.
    pub fn log_initial(&self) -> &[f64] {
        &self.log_initial
    }

    /// Linear-space transition matrix.
    pub fn transitions(&self) -> Vec<Vec<f64>> {
        self.log_transitions
            .iter()
            .map(|row| row.iter().map(|&l| l.exp()).collect())
            .collect()
    }

    /// Linear-space initial probabilities.
    pub fn initial(&self) -> Vec<f64> {
        self.log_initial.iter().map(|&l| l.exp()).collect()
    }

    /// The emission model.
    pub fn emissions(&self) -> &E {
        &self.emissions
    }

    pub(crate) fn emissions_mut(&mut self) -> &mut E {
        &mut self.emissions
    }

    pub(crate) fn set_parameters(
        &mut self,
        log_transitions: Vec<Vec<f64>>,
        log_initial: Vec<f64>,
    ) {
        self.log_transitions = log_transitions;
        self.log_initial = log_initial;
    }

    /// Linear-space transition probability `a[from][to]`.
    pub fn transition(&self, from: usize, to: usize) -> f64 {
        self.log_transitions[from][to].exp()
    }

    /// Log-likelihood of an observation sequence under the model, computed
    /// with the scaled forward recursion.
    pub fn evaluate(&self, observations: &[E::Observation]) -> ModelResult<f64> {
        let (_, _, log_likelihood) = forward_backward::forward(self, observations)?;
        Ok(log_likelihood)
    }

    /// Posterior state probabilities `P(s_t = i | observations)` as a
    /// `T × N` matrix.
    pub fn posteriors(&self, observations: &[E::Observation]) -> ModelResult<Vec<Vec<f64>>> {
        let (fwd, scaling, _) = forward_backward::forward(self, observations)?;
        let bwd = forward_backward::backward(self, observations, &scaling)?;

        let mut gamma = vec![vec![0.0; self.states]; observations.len()];
        for t in 0..observations.len() {
            let mut sum = 0.0;
            for i in 0..self.states {
                gamma[t][i] = fwd[t][i] * bwd[t][i];
                sum += gamma[t][i];
            }
            if sum != 0.0 {
                for g in &mut gamma[t] {
                    *g /= sum;
                }
            }
        }
        Ok(gamma)
    }

    /// Most likely hidden state path (Viterbi), with its log-probability.
    pub fn decode(&self, observations: &[E::Observation]) -> ModelResult<(Vec<usize>, f64)> {
        let t_len = observations.len();
        if t_len == 0 {
            return Err(ModelError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        for x in observations {
            self.emissions.validate_observation(x)?;
        }

        let n = self.states;
        let mut delta = vec![vec![f64::NEG_INFINITY; n]; t_len];
        let mut psi = vec![vec![0usize; n]; t_len];

        for i in 0..n {
            delta[0][i] = self.log_initial[i] + self.emissions.log_density(i, &observations[0]);
        }

        for t in 1..t_len {
            for j in 0..n {
                let mut best = f64::NEG_INFINITY;
                let mut arg = 0;
                for i in 0..n {
                    let score = delta[t - 1][i] + self.log_transitions[i][j];
                    if score > best {
                        best = score;
                        arg = i;
                    }
                }
                delta[t][j] = best + self.emissions.log_density(j, &observations[t]);
                psi[t][j] = arg;
            }
        }

        let mut best_state = 0;
        for i in 1..n {
            if delta[t_len - 1][i] > delta[t_len - 1][best_state] {
                best_state = i;
            }
        }
        let log_probability = delta[t_len - 1][best_state];

        let mut path = vec![0usize; t_len];
        path[t_len - 1] = best_state;
        for t in (1..t_len).rev() {
            path[t - 1] = psi[t][path[t]];
        }

        Ok((path, log_probability))
    }
}

fn validate_stochastic_rows(rows: &[Vec<f64>], name: &str) -> ModelResult<()> {
    for (i, row) in rows.iter().enumerate() {
        for &p in row {
            if !(p.is_finite() && p >= 0.0) {
                return Err(ModelError::InvalidParameter {
                    parameter: format!("{} row {}", name, i),
                    value: p,
                    constraint: "probabilities must be finite and non-negative".to_string(),
                });
            }
        }
        let sum: f64 = row.iter().sum();
        if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(ModelError::InvalidParameter {
                parameter: format!("{} row {}", name, i),
                value: sum,
                constraint: "must sum to 1".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_model() -> HiddenMarkovModel<DiscreteEmissions> {
        let emissions = DiscreteEmissions::new(vec![
            vec![0.9, 0.1],
            vec![0.2, 0.8],
        ])
        .unwrap();
        HiddenMarkovModel::new(
            vec![vec![0.7, 0.3], vec![0.4, 0.6]],
            vec![0.6, 0.4],
            emissions,
        )
        .unwrap()
    }

    #[test]
    fn test_construction_validates_rows() {
        let emissions = DiscreteEmissions::new(vec![
            vec![0.5, 0.5],
            vec![0.5, 0.5],
        ])
        .unwrap();

        // Transition row does not sum to one.
        assert!(HiddenMarkovModel::new(
            vec![vec![0.7, 0.2], vec![0.4, 0.6]],
            vec![0.6, 0.4],
            emissions.clone(),
        )
        .is_err());

        // Initial vector does not sum to one.
        assert!(HiddenMarkovModel::new(
            vec![vec![0.7, 0.3], vec![0.4, 0.6]],
            vec![0.6, 0.6],
            emissions.clone(),
        )
        .is_err());

        // Wrong transition shape for the number of states.
        assert!(HiddenMarkovModel::new(
            vec![vec![1.0]],
            vec![1.0],
            emissions,
        )
        .is_err());
    }

    #[test]
    fn test_discrete_emissions_validation() {
        assert!(DiscreteEmissions::new(vec![vec![0.6, 0.3]]).is_err());
        assert!(DiscreteEmissions::new(vec![vec![0.6, 0.4, 0.1]]).is_err());

        let e = DiscreteEmissions::new(vec![vec![0.6, 0.4]]).unwrap();
        assert_eq!(e.symbols(), 2);
        assert!((e.density(0, &0) - 0.6).abs() < 1e-12);
        assert_eq!(e.log_density(0, &5), f64::NEG_INFINITY);
        assert!(e.validate_observation(&1).is_ok());
        assert!(e.validate_observation(&2).is_err());
    }

    #[test]
    fn test_parameters_round_trip_through_log_space() {
        let model = weather_model();
        let a = model.transitions();
        assert!((a[0][0] - 0.7).abs() < 1e-12);
        assert!((a[1][1] - 0.6).abs() < 1e-12);
        let pi = model.initial();
        assert!((pi[0] - 0.6).abs() < 1e-12);
        assert!((model.transition(0, 1) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_single_observation() {
        let model = weather_model();
        // P(o = 0) = 0.6*0.9 + 0.4*0.2 = 0.62
        let ll = model.evaluate(&[0]).unwrap();
        assert!((ll - (0.62_f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_rejects_bad_input() {
        let model = weather_model();
        assert!(matches!(
            model.evaluate(&[]),
            Err(ModelError::InsufficientData { .. })
        ));
        assert!(matches!(
            model.evaluate(&[0, 2]),
            Err(ModelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_posteriors_rows_normalized() {
        let model = weather_model();
        let gamma = model.posteriors(&[0, 1, 0]).unwrap();
        assert_eq!(gamma.len(), 3);
        for row in &gamma {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        // Observing symbol 0 favors state 0, which emits it with 0.9.
        assert!(gamma[0][0] > gamma[0][1]);
    }

    #[test]
    fn test_decode_follows_evidence() {
        let model = weather_model();
        let (path, log_probability) = model.decode(&[0, 0, 1, 1]).unwrap();
        assert_eq!(path.len(), 4);
        assert!(log_probability < 0.0);
        assert_eq!(path[0], 0);
        assert_eq!(path[3], 1);
    }
}
