//! Forward and backward recursions for hidden Markov models.
//!
//! Two evaluation strategies are provided. The scaled linear-space pair
//! normalizes each forward row by its sum and reuses those scale factors in
//! the backward pass, keeping both trellises in a representable range while
//! the log-likelihood accumulates as the sum of log scale factors. The
//! log-space pair trades speed for robustness on longer sequences or more
//! extreme densities, reducing with log-sum-exp throughout.
//!
//! All scratch matrices are allocated per call and handed to the caller;
//! nothing is shared between invocations.

use crate::errors::{validate_lengths_match, ModelError, ModelResult};
use crate::hmm::{EmissionModel, HiddenMarkovModel};
use crate::numeric::log_sum_exp;

fn validate_sequence<E: EmissionModel>(
    model: &HiddenMarkovModel<E>,
    observations: &[E::Observation],
) -> ModelResult<()> {
    if observations.is_empty() {
        return Err(ModelError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    for x in observations {
        model.emissions().validate_observation(x)?;
    }
    Ok(())
}

/// Scaled forward recursion.
///
/// Returns the `T × N` forward trellis, the per-step scale factors and the
/// sequence log-likelihood `Σ_t ln scaling[t]`. A zero row sum leaves that
/// row unnormalized and drives the log-likelihood to negative infinity.
pub fn forward<E: EmissionModel>(
    model: &HiddenMarkovModel<E>,
    observations: &[E::Observation],
) -> ModelResult<(Vec<Vec<f64>>, Vec<f64>, f64)> {
    validate_sequence(model, observations)?;
    let t_len = observations.len();
    let n = model.states();
    let pi = model.initial();
    let a = model.transitions();
    let emissions = model.emissions();

    let mut fwd = vec![vec![0.0; n]; t_len];
    let mut scaling = vec![0.0; t_len];

    for i in 0..n {
        fwd[0][i] = pi[i] * emissions.density(i, &observations[0]);
        scaling[0] += fwd[0][i];
    }
    if scaling[0] != 0.0 {
        for v in &mut fwd[0] {
            *v /= scaling[0];
        }
    }

    for t in 1..t_len {
        for j in 0..n {
            let mut sum = 0.0;
            for i in 0..n {
                sum += fwd[t - 1][i] * a[i][j];
            }
            fwd[t][j] = sum * emissions.density(j, &observations[t]);
            scaling[t] += fwd[t][j];
        }
        if scaling[t] != 0.0 {
            for v in &mut fwd[t] {
                *v /= scaling[t];
            }
        }
    }

    let log_likelihood = scaling.iter().map(|&s| s.ln()).sum();
    Ok((fwd, scaling, log_likelihood))
}

/// Scaled backward recursion.
///
/// Must be given the scale factors produced by [`forward`] on the same
/// sequence; using matching factors is what makes the forward and backward
/// trellises combinable into posteriors without re-normalization.
pub fn backward<E: EmissionModel>(
    model: &HiddenMarkovModel<E>,
    observations: &[E::Observation],
    scaling: &[f64],
) -> ModelResult<Vec<Vec<f64>>> {
    validate_sequence(model, observations)?;
    let t_len = observations.len();
    validate_lengths_match(t_len, scaling.len(), "backward scale factors")?;
    let n = model.states();
    let a = model.transitions();
    let emissions = model.emissions();

    let mut bwd = vec![vec![0.0; n]; t_len];
    for i in 0..n {
        bwd[t_len - 1][i] = 1.0 / scaling[t_len - 1];
    }

    for t in (0..t_len - 1).rev() {
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += a[i][j] * emissions.density(j, &observations[t + 1]) * bwd[t + 1][j];
            }
            bwd[t][i] = sum / scaling[t];
        }
    }

    Ok(bwd)
}

/// Log-space forward recursion.
///
/// Returns the log-domain trellis and the log-likelihood
/// `logsumexp_i lnfwd[T−1][i]`.
pub fn log_forward<E: EmissionModel>(
    model: &HiddenMarkovModel<E>,
    observations: &[E::Observation],
) -> ModelResult<(Vec<Vec<f64>>, f64)> {
    validate_sequence(model, observations)?;
    let t_len = observations.len();
    let n = model.states();
    let log_pi = model.log_initial();
    let log_a = model.log_transitions();
    let emissions = model.emissions();

    let mut lnfwd = vec![vec![f64::NEG_INFINITY; n]; t_len];
    for i in 0..n {
        lnfwd[0][i] = log_pi[i] + emissions.log_density(i, &observations[0]);
    }

    let mut terms = vec![0.0; n];
    for t in 1..t_len {
        for j in 0..n {
            for i in 0..n {
                terms[i] = lnfwd[t - 1][i] + log_a[i][j];
            }
            lnfwd[t][j] = log_sum_exp(&terms) + emissions.log_density(j, &observations[t]);
        }
    }

    let log_likelihood = log_sum_exp(&lnfwd[t_len - 1]);
    Ok((lnfwd, log_likelihood))
}

/// Log-space backward recursion.
///
/// Returns the log-domain trellis and the log-likelihood recovered from the
/// initial step, `logsumexp_i (lnbwd[0][i] + ln π_i + ln b_i(o_0))`.
pub fn log_backward<E: EmissionModel>(
    model: &HiddenMarkovModel<E>,
    observations: &[E::Observation],
) -> ModelResult<(Vec<Vec<f64>>, f64)> {
    validate_sequence(model, observations)?;
    let t_len = observations.len();
    let n = model.states();
    let log_pi = model.log_initial();
    let log_a = model.log_transitions();
    let emissions = model.emissions();

    let mut lnbwd = vec![vec![0.0; n]; t_len];
    let mut terms = vec![0.0; n];

    for t in (0..t_len - 1).rev() {
        for i in 0..n {
            for j in 0..n {
                terms[j] = log_a[i][j]
                    + emissions.log_density(j, &observations[t + 1])
                    + lnbwd[t + 1][j];
            }
            lnbwd[t][i] = log_sum_exp(&terms);
        }
    }

    for i in 0..n {
        terms[i] = lnbwd[0][i] + log_pi[i] + emissions.log_density(i, &observations[0]);
    }
    let log_likelihood = log_sum_exp(&terms);
    Ok((lnbwd, log_likelihood))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::DiscreteEmissions;

    fn model() -> HiddenMarkovModel<DiscreteEmissions> {
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
    fn test_forward_rows_normalized() {
        let m = model();
        let (fwd, scaling, ll) = forward(&m, &[0, 1, 0, 1]).unwrap();
        for row in &fwd {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        assert_eq!(scaling.len(), 4);
        assert!(ll < 0.0);
        // First scale factor is the single-observation likelihood.
        assert!((scaling[0] - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_scaled_and_log_likelihoods_agree() {
        let m = model();
        let obs = [0usize, 1, 0, 0, 1, 1, 0];
        let (_, _, scaled_ll) = forward(&m, &obs).unwrap();
        let (_, log_ll) = log_forward(&m, &obs).unwrap();
        let (_, back_ll) = log_backward(&m, &obs).unwrap();
        assert!((scaled_ll - log_ll).abs() < 1e-9);
        assert!((scaled_ll - back_ll).abs() < 1e-9);
    }

    #[test]
    fn test_forward_backward_product_is_constant() {
        let m = model();
        let obs = [0usize, 1, 0];
        let (fwd, scaling, _) = forward(&m, &obs).unwrap();
        let bwd = backward(&m, &obs, &scaling).unwrap();
        for t in 0..obs.len() {
            let product: f64 = (0..m.states()).map(|i| fwd[t][i] * bwd[t][i]).sum();
            assert!((scaling[t] * product - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let m = model();
        assert!(matches!(
            forward(&m, &[]),
            Err(ModelError::InsufficientData { .. })
        ));
        assert!(matches!(
            log_forward(&m, &[]),
            Err(ModelError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_backward_requires_matching_scaling() {
        let m = model();
        let obs = [0usize, 1];
        assert!(matches!(
            backward(&m, &obs, &[1.0]),
            Err(ModelError::DimensionMismatch { .. })
        ));
    }
}
