//! Error types and validation functions for the modeling engine.
//!
//! All public entry points validate their arguments up front and report
//! failures through [`ModelError`]; no operation silently coerces malformed
//! input or returns a partial result after a failed decomposition or fit.

use thiserror::Error;

/// Errors reported by decompositions, distributions and learning algorithms.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ModelError {
    /// Vector or matrix arguments disagree in length at a public entry point.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Operation or argument the mismatch was detected in
        context: String,
        /// Expected dimension
        expected: usize,
        /// Dimension actually provided
        actual: usize,
    },

    /// A parameter value is outside its valid domain.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Offending value
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// An operation requiring symmetry was invoked on a decomposition whose
    /// input failed the element-by-element symmetry check.
    #[error("Matrix is not symmetric: required by {operation}")]
    NonSymmetricMatrix {
        /// Operation that requires symmetry
        operation: String,
    },

    /// An operation requiring positive definiteness was invoked on a
    /// decomposition whose input failed the pivot-sign check.
    #[error("Matrix is not positive definite: required by {operation}")]
    NonPositiveDefiniteMatrix {
        /// Operation that requires positive definiteness
        operation: String,
    },

    /// The square-root-free LDLt factorization hit a zero pivot; the matrix
    /// has no such decomposition.
    #[error("Matrix has no LDLt decomposition: zero pivot at index {pivot}")]
    SingularMatrix {
        /// Index of the zero pivot
        pivot: usize,
    },

    /// Iterative fitting diverged or failed to converge; the model retains
    /// its pre-fit state.
    #[error("Fitting did not converge: {reason}")]
    ConvergenceFailure {
        /// Why the fit was abandoned
        reason: String,
    },

    /// Too few observations for the requested estimation.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Minimum required observations
        required: usize,
        /// Observations actually provided
        actual: usize,
    },

    /// Residual numerical failure (non-finite intermediate values).
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for the failure
        reason: String,
    },
}

/// Result type for all fallible operations in this crate.
pub type ModelResult<T> = Result<T, ModelError>;

/// Validates that all values in a slice are finite.
///
/// Returns immediately on the first non-finite value, naming its index.
pub fn validate_all_finite(data: &[f64], name: &str) -> ModelResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, &v)| !v.is_finite()) {
        return Err(ModelError::NumericalError {
            reason: format!("{} contains non-finite value at index {}: {}", name, i, value),
        });
    }
    Ok(())
}

/// Validates that two lengths agree.
pub fn validate_lengths_match(expected: usize, actual: usize, context: &str) -> ModelResult<()> {
    if expected != actual {
        return Err(ModelError::DimensionMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Validates a weight vector: finite, non-negative, with positive total mass.
pub fn validate_weights(weights: &[f64], context: &str) -> ModelResult<()> {
    validate_all_finite(weights, context)?;
    if let Some((i, &w)) = weights.iter().enumerate().find(|(_, &w)| w < 0.0) {
        return Err(ModelError::InvalidParameter {
            parameter: format!("{}[{}]", context, i),
            value: w,
            constraint: "must be non-negative".to_string(),
        });
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(ModelError::InvalidParameter {
            parameter: context.to_string(),
            value: total,
            constraint: "weights must have positive total mass".to_string(),
        });
    }
    Ok(())
}

/// Validates that a matrix is rectangular (not ragged) and non-empty.
///
/// Returns the matrix dimensions `(rows, cols)`.
pub fn ensure_rectangular(a: &[Vec<f64>], operation: &str) -> ModelResult<(usize, usize)> {
    if a.is_empty() {
        return Err(ModelError::DimensionMismatch {
            context: format!("{}: empty matrix", operation),
            expected: 1,
            actual: 0,
        });
    }
    let n = a[0].len();
    if n == 0 {
        return Err(ModelError::DimensionMismatch {
            context: format!("{}: zero-width matrix", operation),
            expected: 1,
            actual: 0,
        });
    }
    if let Some((i, row)) = a.iter().enumerate().find(|(_, row)| row.len() != n) {
        return Err(ModelError::DimensionMismatch {
            context: format!("{}: ragged matrix at row {}", operation, i),
            expected: n,
            actual: row.len(),
        });
    }
    Ok((a.len(), n))
}

/// Validates that a matrix is square, returning its order.
pub fn ensure_square(a: &[Vec<f64>], operation: &str) -> ModelResult<usize> {
    let (rows, cols) = ensure_rectangular(a, operation)?;
    if rows != cols {
        return Err(ModelError::DimensionMismatch {
            context: format!("{}: matrix is not square", operation),
            expected: rows,
            actual: cols,
        });
    }
    Ok(rows)
}

/// Validates that every entry of a matrix is finite.
pub fn validate_finite_matrix(a: &[Vec<f64>], name: &str) -> ModelResult<()> {
    for (i, row) in a.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(ModelError::NumericalError {
                    reason: format!(
                        "{} contains non-finite value at [{},{}]: {}",
                        name, i, j, val
                    ),
                });
            }
        }
    }
    Ok(())
}
