//! K-Means clustering with K-Means++ seeding.
//!
//! Serves as the initialization stage for Gaussian mixture estimation: it
//! produces centroids, hard assignments, cluster proportions and per-cluster
//! empirical covariances in one pass.

use log::warn;
use rand::Rng;

use crate::errors::{ensure_rectangular, ModelError, ModelResult};
use crate::matrix;

/// K-Means configuration.
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Number of clusters.
    pub k: usize,
    /// Lloyd iteration cap.
    pub max_iterations: usize,
    /// Maximum centroid movement below which the clustering has converged.
    pub tolerance: f64,
}

impl KMeans {
    /// Creates a clustering configuration with default iteration settings.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Outcome of a K-Means run.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Final cluster centroids.
    pub centroids: Vec<Vec<f64>>,
    /// Hard cluster assignment per observation.
    pub assignments: Vec<usize>,
    /// Fraction of observations per cluster.
    pub proportions: Vec<f64>,
    /// Empirical covariance per cluster (`n - 1` divisor); clusters with
    /// fewer than two members fall back to the identity.
    pub covariances: Vec<Vec<Vec<f64>>>,
}

impl KMeans {
    /// Runs K-Means++ seeding followed by Lloyd iterations.
    pub fn fit<R: Rng + ?Sized>(
        &self,
        data: &[Vec<f64>],
        rng: &mut R,
    ) -> ModelResult<KMeansResult> {
        if self.k == 0 {
            return Err(ModelError::InvalidParameter {
                parameter: "k".to_string(),
                value: 0.0,
                constraint: "must be at least 1".to_string(),
            });
        }
        let (rows, cols) = ensure_rectangular(data, "kmeans")?;
        if rows < self.k {
            return Err(ModelError::InsufficientData {
                required: self.k,
                actual: rows,
            });
        }

        let mut centroids = self.initialize_centroids(data, rng);
        let mut assignments = vec![0usize; rows];

        for _ in 0..self.max_iterations {
            // Assignment step.
            for (i, point) in data.iter().enumerate() {
                assignments[i] = nearest_centroid(point, &centroids);
            }

            // Update step.
            let mut sums = vec![vec![0.0; cols]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, &c) in data.iter().zip(&assignments) {
                counts[c] += 1;
                for (s, &v) in sums[c].iter_mut().zip(point) {
                    *s += v;
                }
            }

            let mut max_shift: f64 = 0.0;
            for c in 0..self.k {
                if counts[c] == 0 {
                    warn!("cluster {} is empty; keeping its previous centroid", c);
                    continue;
                }
                for (j, s) in sums[c].iter().enumerate() {
                    let new = s / counts[c] as f64;
                    max_shift = max_shift.max((new - centroids[c][j]).abs());
                    centroids[c][j] = new;
                }
            }

            if max_shift < self.tolerance {
                break;
            }
        }

        for (i, point) in data.iter().enumerate() {
            assignments[i] = nearest_centroid(point, &centroids);
        }

        let mut proportions = vec![0.0; self.k];
        let mut members: Vec<Vec<Vec<f64>>> = vec![Vec::new(); self.k];
        for (point, &c) in data.iter().zip(&assignments) {
            proportions[c] += 1.0;
            members[c].push(point.clone());
        }
        for p in &mut proportions {
            *p /= rows as f64;
        }

        let covariances = members
            .iter()
            .map(|m| {
                if m.len() >= 2 {
                    matrix::covariance(m).unwrap_or_else(|_| matrix::identity(cols))
                } else {
                    matrix::identity(cols)
                }
            })
            .collect();

        Ok(KMeansResult {
            centroids,
            assignments,
            proportions,
            covariances,
        })
    }

    /// K-Means++ seeding: the first centroid uniformly at random, each
    /// following one with probability proportional to its squared distance
    /// from the nearest already-chosen centroid.
    fn initialize_centroids<R: Rng + ?Sized>(
        &self,
        data: &[Vec<f64>],
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(data[rng.gen_range(0..data.len())].clone());

        while centroids.len() < self.k {
            let distances: Vec<f64> = data
                .iter()
                .map(|point| {
                    centroids
                        .iter()
                        .map(|c| squared_distance(point, c))
                        .fold(f64::INFINITY, f64::min)
                })
                .collect();
            let total: f64 = distances.iter().sum();

            let next = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut chosen = data.len() - 1;
                for (i, &d) in distances.iter().enumerate() {
                    target -= d;
                    if target <= 0.0 {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                // All points coincide with a centroid; any choice is fine.
                rng.gen_range(0..data.len())
            };
            centroids.push(data[next].clone());
        }
        centroids
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_distance {
            best_distance = d;
            best = c;
        }
    }
    best
}
