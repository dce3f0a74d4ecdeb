//! Cholesky factorization of symmetric matrices.
//!
//! Two factorization paths are provided. The standard path computes the
//! classic `L·Lᵀ` factor with square roots; it never fails on indefinite or
//! asymmetric input, recording `symmetric` and `positive_definite` flags
//! instead so the caller can decompose speculatively and inspect the outcome.
//! The robust path computes the square-root-free `L·D·Lᵀ` factorization,
//! which tolerates indefinite matrices but fails fast on a zero pivot.
//!
//! Determinant, log-determinant and nonsingularity are computed lazily and
//! memoized; repeated queries reuse the cached value.

use once_cell::unsync::OnceCell;

use crate::errors::{ensure_square, validate_lengths_match, ModelError, ModelResult};
use crate::matrix;

/// Cholesky decomposition of a symmetric matrix, `A = L·Lᵀ` or `A = L·D·Lᵀ`.
#[derive(Debug, Clone)]
pub struct CholeskyDecomposition {
    l: Vec<Vec<f64>>,
    d: Vec<f64>,
    n: usize,
    symmetric: bool,
    positive_definite: bool,
    robust: bool,
    determinant: OnceCell<f64>,
    log_determinant: OnceCell<f64>,
    nonsingular: OnceCell<bool>,
}

impl CholeskyDecomposition {
    /// Computes the standard `L·Lᵀ` factorization.
    ///
    /// Symmetry and positive definiteness are checked during the pass and
    /// recorded as flags; the constructor itself only fails on non-square
    /// input. Operations that need those properties check the flags.
    pub fn new(a: &[Vec<f64>]) -> ModelResult<Self> {
        let n = ensure_square(a, "cholesky")?;

        let mut l = vec![vec![0.0; n]; n];
        let mut symmetric = true;
        let mut positive_definite = true;

        for j in 0..n {
            let mut d = 0.0;
            for k in 0..j {
                let mut s = 0.0;
                for i in 0..k {
                    s += l[k][i] * l[j][i];
                }
                let value = (a[j][k] - s) / l[k][k];
                l[j][k] = value;
                d += value * value;
                symmetric &= a[k][j] == a[j][k];
            }
            let pivot = a[j][j] - d;
            positive_definite &= pivot > 0.0;
            l[j][j] = pivot.max(0.0).sqrt();
        }

        Ok(Self {
            l,
            d: vec![1.0; n],
            n,
            symmetric,
            positive_definite,
            robust: false,
            determinant: OnceCell::new(),
            log_determinant: OnceCell::new(),
            nonsingular: OnceCell::new(),
        })
    }

    /// Computes the square-root-free `L·D·Lᵀ` factorization.
    ///
    /// Handles indefinite matrices (negative entries in `D`), but a zero
    /// pivot means the matrix has no such factorization and is rejected
    /// immediately rather than letting division by zero poison the factor.
    pub fn new_robust(a: &[Vec<f64>]) -> ModelResult<Self> {
        let n = ensure_square(a, "cholesky (robust)")?;

        let mut l = vec![vec![0.0; n]; n];
        let mut d = vec![0.0; n];
        let mut v = vec![0.0; n];
        let mut symmetric = true;
        let mut positive_definite = true;

        for i in 0..n {
            for j in 0..i {
                v[j] = l[i][j] * d[j];
            }

            let mut pivot = 0.0;
            for k in 0..i {
                pivot += l[i][k] * v[k];
            }
            pivot = a[i][i] - pivot;
            d[i] = pivot;

            positive_definite &= pivot > 1e-14 * a[i][i].abs();

            if pivot == 0.0 {
                return Err(ModelError::SingularMatrix { pivot: i });
            }

            for k in (i + 1)..n {
                let mut s = 0.0;
                for j in 0..i {
                    s += l[k][j] * v[j];
                }
                l[k][i] = (a[k][i] - s) / pivot;
                symmetric &= a[i][k] == a[k][i];
            }
        }

        for (i, row) in l.iter_mut().enumerate() {
            row[i] += 1.0;
        }

        Ok(Self {
            l,
            d,
            n,
            symmetric,
            positive_definite,
            robust: true,
            determinant: OnceCell::new(),
            log_determinant: OnceCell::new(),
            nonsingular: OnceCell::new(),
        })
    }

    /// Adopts a precomputed lower-triangular factor as an `L·Lᵀ`
    /// decomposition.
    pub fn from_left_triangular(l: Vec<Vec<f64>>) -> ModelResult<Self> {
        let n = ensure_square(&l, "cholesky from factor")?;
        let positive_definite = (0..n).all(|i| l[i][i] > 0.0);
        Ok(Self {
            l,
            d: vec![1.0; n],
            n,
            symmetric: true,
            positive_definite,
            robust: false,
            determinant: OnceCell::new(),
            log_determinant: OnceCell::new(),
            nonsingular: OnceCell::new(),
        })
    }

    /// Order of the decomposed matrix.
    pub fn order(&self) -> usize {
        self.n
    }

    /// Whether the input matrix was symmetric.
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Whether the input matrix was positive definite.
    pub fn is_positive_definite(&self) -> bool {
        self.positive_definite
    }

    /// Whether this is the square-root-free `L·D·Lᵀ` variant.
    pub fn is_robust(&self) -> bool {
        self.robust
    }

    /// The lower-triangular factor `L`.
    pub fn left_triangular(&self) -> &[Vec<f64>] {
        &self.l
    }

    /// The diagonal factor `D` (all ones for the standard path).
    pub fn diagonal(&self) -> &[f64] {
        &self.d
    }

    fn require_solvable(&self, operation: &str) -> ModelResult<()> {
        if !self.symmetric {
            return Err(ModelError::NonSymmetricMatrix {
                operation: operation.to_string(),
            });
        }
        if !self.robust && !self.positive_definite {
            return Err(ModelError::NonPositiveDefiniteMatrix {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Solves `A·x = b` for a single right-hand side.
    pub fn solve_vector(&self, b: &[f64]) -> ModelResult<Vec<f64>> {
        self.require_solvable("solve")?;
        validate_lengths_match(self.n, b.len(), "solve right-hand side")?;

        let mut x = b.to_vec();

        // Forward substitution, L * y = b.
        for k in 0..self.n {
            for j in 0..k {
                x[k] -= x[j] * self.l[k][j];
            }
            x[k] /= self.l[k][k];
        }

        if self.robust {
            for k in 0..self.n {
                x[k] /= self.d[k];
            }
        }

        // Backward substitution, L' * x = y.
        for k in (0..self.n).rev() {
            for j in (k + 1)..self.n {
                x[k] -= x[j] * self.l[j][k];
            }
            x[k] /= self.l[k][k];
        }

        Ok(x)
    }

    /// Solves `A·X = B` for a matrix right-hand side.
    pub fn solve_matrix(&self, b: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
        self.require_solvable("solve")?;
        let (rows, cols) = crate::errors::ensure_rectangular(b, "solve right-hand side")?;
        validate_lengths_match(self.n, rows, "solve right-hand side rows")?;

        let mut x: Vec<Vec<f64>> = b.to_vec();

        for k in 0..self.n {
            for j in 0..k {
                for c in 0..cols {
                    let t = x[j][c] * self.l[k][j];
                    x[k][c] -= t;
                }
            }
            for c in 0..cols {
                x[k][c] /= self.l[k][k];
            }
        }

        if self.robust {
            for k in 0..self.n {
                for c in 0..cols {
                    x[k][c] /= self.d[k];
                }
            }
        }

        for k in (0..self.n).rev() {
            for j in (k + 1)..self.n {
                for c in 0..cols {
                    let t = x[j][c] * self.l[j][k];
                    x[k][c] -= t;
                }
            }
            for c in 0..cols {
                x[k][c] /= self.l[k][k];
            }
        }

        Ok(x)
    }

    /// Computes `A⁻¹` by solving against the identity.
    pub fn inverse(&self) -> ModelResult<Vec<Vec<f64>>> {
        self.solve_matrix(&matrix::identity(self.n))
    }

    fn require_symmetric(&self, operation: &str) -> ModelResult<()> {
        if !self.symmetric {
            return Err(ModelError::NonSymmetricMatrix {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Determinant of the decomposed matrix. Memoized after first use.
    pub fn determinant(&self) -> ModelResult<f64> {
        self.require_symmetric("determinant")?;
        Ok(*self.determinant.get_or_init(|| {
            let mut det = 1.0;
            for i in 0..self.n {
                det *= self.l[i][i] * self.l[i][i] * self.d[i];
            }
            det
        }))
    }

    /// Natural logarithm of the determinant. Memoized after first use.
    ///
    /// Stays finite where `determinant` would overflow or underflow. Only
    /// meaningful when the determinant is positive: on a robust
    /// factorization of an indefinite matrix some `D[i]` are negative and
    /// the result is NaN, while [`determinant`](Self::determinant) still
    /// returns the signed value. Callers working with indefinite matrices
    /// should use `determinant` and branch on its sign.
    pub fn log_determinant(&self) -> ModelResult<f64> {
        self.require_symmetric("log_determinant")?;
        Ok(*self.log_determinant.get_or_init(|| {
            let mut logdet = 0.0;
            for i in 0..self.n {
                logdet += 2.0 * self.l[i][i].ln() + self.d[i].ln();
            }
            logdet
        }))
    }

    /// Whether the decomposed matrix is nonsingular. Memoized after first
    /// use.
    pub fn is_nonsingular(&self) -> ModelResult<bool> {
        self.require_symmetric("is_nonsingular")?;
        Ok(*self
            .nonsingular
            .get_or_init(|| (0..self.n).all(|i| self.l[i][i] != 0.0 && self.d[i] != 0.0)))
    }

    /// Reconstructs `A` from the factors, mainly for testing.
    pub fn reconstruct(&self) -> Vec<Vec<f64>> {
        let mut a = vec![vec![0.0; self.n]; self.n];
        for i in 0..self.n {
            for j in 0..self.n {
                let mut sum = 0.0;
                for k in 0..=i.min(j) {
                    sum += self.l[i][k] * self.d[k] * self.l[j][k];
                }
                a[i][j] = sum;
            }
        }
        a
    }
}
