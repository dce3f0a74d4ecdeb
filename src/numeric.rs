//! Shared numeric constants and stable log-domain helpers.

/// Natural logarithm of 2π, used in Gaussian log-normalization constants.
pub const LN_TWO_PI: f64 = 1.837_877_066_409_345_5;

/// Relative tolerance below which two probability row sums are considered
/// equal to one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-10;

/// Tolerance on mixture coefficient sums at construction time.
pub const COEFFICIENT_SUM_TOLERANCE: f64 = 1e-6;

/// Computes `ln(exp(a) + exp(b))` without overflow.
///
/// Either argument may be negative infinity, representing a zero probability.
pub fn log_sum(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Computes `ln(Σ exp(x_i))` over a slice without overflow.
///
/// Returns negative infinity for an empty slice or when every entry is
/// negative infinity.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}
