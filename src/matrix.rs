//! Dense matrix kernel over row-major `Vec<Vec<f64>>`.
//!
//! All operations validate shape and finiteness up front and return fresh
//! matrices; inputs are never mutated in place. Statistics functions document
//! their divisor: sample covariance uses `n - 1`, weighted covariance uses the
//! total weight (population semantics, appropriate for responsibility
//! weights that already encode effective sample sizes).

use crate::errors::{
    ensure_rectangular, ensure_square, validate_lengths_match, validate_weights, ModelError,
    ModelResult,
};

/// Multiplies two matrices, returning a new `rows(a) × cols(b)` matrix.
pub fn multiply(a: &[Vec<f64>], b: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
    let (a_rows, a_cols) = ensure_rectangular(a, "multiply lhs")?;
    let (b_rows, b_cols) = ensure_rectangular(b, "multiply rhs")?;
    validate_lengths_match(a_cols, b_rows, "multiply inner dimension")?;

    let mut result = vec![vec![0.0; b_cols]; a_rows];
    for i in 0..a_rows {
        for k in 0..a_cols {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..b_cols {
                result[i][j] += aik * b[k][j];
            }
        }
    }
    Ok(result)
}

/// Multiplies a matrix by a column vector.
pub fn multiply_vector(a: &[Vec<f64>], x: &[f64]) -> ModelResult<Vec<f64>> {
    let (rows, cols) = ensure_rectangular(a, "multiply_vector")?;
    validate_lengths_match(cols, x.len(), "multiply_vector operand")?;

    let mut result = vec![0.0; rows];
    for (i, row) in a.iter().enumerate() {
        result[i] = row.iter().zip(x).map(|(&aij, &xj)| aij * xj).sum();
    }
    Ok(result)
}

/// Transposes a matrix.
pub fn transpose(a: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
    let (rows, cols) = ensure_rectangular(a, "transpose")?;
    let mut result = vec![vec![0.0; rows]; cols];
    for i in 0..rows {
        for j in 0..cols {
            result[j][i] = a[i][j];
        }
    }
    Ok(result)
}

/// Returns the `n × n` identity matrix.
pub fn identity(n: usize) -> Vec<Vec<f64>> {
    let mut result = vec![vec![0.0; n]; n];
    for (i, row) in result.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    result
}

/// Builds a square matrix with `d` on the diagonal and zeros elsewhere.
pub fn diagonal_matrix(d: &[f64]) -> Vec<Vec<f64>> {
    let n = d.len();
    let mut result = vec![vec![0.0; n]; n];
    for (i, row) in result.iter_mut().enumerate() {
        row[i] = d[i];
    }
    result
}

/// Extracts the diagonal of a square matrix.
pub fn diagonal(a: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
    let n = ensure_square(a, "diagonal")?;
    Ok((0..n).map(|i| a[i][i]).collect())
}

/// Extracts the submatrix selected by the given row and column indices.
pub fn submatrix(a: &[Vec<f64>], rows: &[usize], cols: &[usize]) -> ModelResult<Vec<Vec<f64>>> {
    let (n_rows, n_cols) = ensure_rectangular(a, "submatrix")?;
    for &r in rows {
        if r >= n_rows {
            return Err(ModelError::DimensionMismatch {
                context: "submatrix row index".to_string(),
                expected: n_rows,
                actual: r,
            });
        }
    }
    for &c in cols {
        if c >= n_cols {
            return Err(ModelError::DimensionMismatch {
                context: "submatrix column index".to_string(),
                expected: n_cols,
                actual: c,
            });
        }
    }
    Ok(rows
        .iter()
        .map(|&r| cols.iter().map(|&c| a[r][c]).collect())
        .collect())
}

/// Dot product of two equal-length vectors.
pub fn inner_product(x: &[f64], y: &[f64]) -> ModelResult<f64> {
    validate_lengths_match(x.len(), y.len(), "inner_product")?;
    Ok(x.iter().zip(y).map(|(&a, &b)| a * b).sum())
}

/// Per-column mean of a data matrix with observations as rows.
pub fn column_mean(data: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
    let (rows, cols) = ensure_rectangular(data, "column_mean")?;
    let mut mean = vec![0.0; cols];
    for row in data {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= rows as f64;
    }
    Ok(mean)
}

/// Weighted per-column mean; weights are normalized by their total mass.
pub fn weighted_column_mean(data: &[Vec<f64>], weights: &[f64]) -> ModelResult<Vec<f64>> {
    let (rows, cols) = ensure_rectangular(data, "weighted_column_mean")?;
    validate_lengths_match(rows, weights.len(), "weighted_column_mean weights")?;
    validate_weights(weights, "weighted_column_mean weights")?;

    let total: f64 = weights.iter().sum();
    let mut mean = vec![0.0; cols];
    for (row, &w) in data.iter().zip(weights) {
        for (m, &v) in mean.iter_mut().zip(row) {
            *m += w * v;
        }
    }
    for m in &mut mean {
        *m /= total;
    }
    Ok(mean)
}

/// Per-column sample variance (`n - 1` divisor).
pub fn column_variance(data: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
    let (rows, cols) = ensure_rectangular(data, "column_variance")?;
    if rows < 2 {
        return Err(ModelError::InsufficientData {
            required: 2,
            actual: rows,
        });
    }
    let mean = column_mean(data)?;
    let mut var = vec![0.0; cols];
    for row in data {
        for ((v, &x), &m) in var.iter_mut().zip(row).zip(&mean) {
            let d = x - m;
            *v += d * d;
        }
    }
    for v in &mut var {
        *v /= (rows - 1) as f64;
    }
    Ok(var)
}

/// Weighted per-column variance around the weighted mean (total-weight
/// divisor, population semantics).
pub fn weighted_column_variance(data: &[Vec<f64>], weights: &[f64]) -> ModelResult<Vec<f64>> {
    let (rows, cols) = ensure_rectangular(data, "weighted_column_variance")?;
    validate_lengths_match(rows, weights.len(), "weighted_column_variance weights")?;
    validate_weights(weights, "weighted_column_variance weights")?;

    let mean = weighted_column_mean(data, weights)?;
    let total: f64 = weights.iter().sum();
    let mut var = vec![0.0; cols];
    for (row, &w) in data.iter().zip(weights) {
        for ((v, &x), &m) in var.iter_mut().zip(row).zip(&mean) {
            let d = x - m;
            *v += w * d * d;
        }
    }
    for v in &mut var {
        *v /= total;
    }
    Ok(var)
}

/// Sample covariance matrix of a data matrix with observations as rows
/// (`n - 1` divisor).
pub fn covariance(data: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
    let (rows, _) = ensure_rectangular(data, "covariance")?;
    if rows < 2 {
        return Err(ModelError::InsufficientData {
            required: 2,
            actual: rows,
        });
    }
    let mean = column_mean(data)?;
    Ok(covariance_about(data, &mean, (rows - 1) as f64))
}

/// Weighted covariance matrix around the weighted mean (total-weight divisor).
pub fn weighted_covariance(data: &[Vec<f64>], weights: &[f64]) -> ModelResult<Vec<Vec<f64>>> {
    let (rows, cols) = ensure_rectangular(data, "weighted_covariance")?;
    validate_lengths_match(rows, weights.len(), "weighted_covariance weights")?;
    validate_weights(weights, "weighted_covariance weights")?;

    let mean = weighted_column_mean(data, weights)?;
    let total: f64 = weights.iter().sum();
    let mut cov = vec![vec![0.0; cols]; cols];
    for (row, &w) in data.iter().zip(weights) {
        for i in 0..cols {
            let di = row[i] - mean[i];
            for j in i..cols {
                cov[i][j] += w * di * (row[j] - mean[j]);
            }
        }
    }
    for i in 0..cols {
        for j in i..cols {
            cov[i][j] /= total;
            cov[j][i] = cov[i][j];
        }
    }
    Ok(cov)
}

fn covariance_about(data: &[Vec<f64>], mean: &[f64], divisor: f64) -> Vec<Vec<f64>> {
    let cols = mean.len();
    let mut cov = vec![vec![0.0; cols]; cols];
    for row in data {
        for i in 0..cols {
            let di = row[i] - mean[i];
            for j in i..cols {
                cov[i][j] += di * (row[j] - mean[j]);
            }
        }
    }
    for i in 0..cols {
        for j in i..cols {
            cov[i][j] /= divisor;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}
