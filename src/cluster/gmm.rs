//! Gaussian Mixture Model refinement.
//!
//! Soft clustering fit by Expectation-Maximization, seeded from a completed
//! k-means partition rather than random initialization: the partition's
//! groups define the initial means, mixture weights and covariances, and EM
//! then reassigns probability mass between neighbouring clusters.
//!
//! # Missing data
//!
//! Rows of the composite matrix carry NaN where data was unusable, so the
//! density of row x under component k is evaluated on the subset of
//! dimensions where both x and μ_k are finite. That subset changes per row
//! and per component, which means a fresh covariance submatrix, determinant
//! and solve for every evaluation. All likelihood work happens in log space
//! with a log-sum-exp normalization; covariance matrices are regularized
//! with a small diagonal constant to stay invertible.
//!
//! EM runs for a fixed iteration budget. There is no likelihood-based early
//! stop; the budget is small (default 20) because the k-means seed already
//! sits near a mode.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Diagonal regularization added to every covariance matrix.
const COV_REGULARIZATION: f64 = 1e-5;

/// Outcome of a GMM run.
#[derive(Debug, Clone)]
pub struct GmmResult {
    /// Hard labels: argmax responsibility per row.
    pub labels: Vec<usize>,
    /// Per-row responsibilities, rows summing to 1.
    pub responsibilities: Array2<f64>,
}

/// Gaussian mixture fit by EM from a k-means seed.
#[derive(Debug, Clone)]
pub struct Gmm {
    n_components: usize,
    max_iter: usize,
}

impl Gmm {
    /// Create a mixture with `n_components` components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 20,
        }
    }

    /// Set the EM iteration budget.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fit from a k-means partition (one member-row list per component).
    pub fn fit_from_partition(
        &self,
        data: &Array2<f32>,
        groups: &[Vec<usize>],
    ) -> Result<GmmResult> {
        let n = data.nrows();
        let d = data.ncols();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput);
        }
        if groups.len() != self.n_components || groups.iter().any(Vec::is_empty) {
            return Err(Error::InvalidClusterCount {
                requested: self.n_components,
                n_items: groups.len(),
            });
        }

        // Seed parameters from the hard partition.
        let mut resp = Array2::<f64>::zeros((n, self.n_components));
        for (k, group) in groups.iter().enumerate() {
            for &row in group {
                resp[[row, k]] = 1.0;
            }
        }
        let mut weights = Array1::<f64>::zeros(self.n_components);
        for (k, group) in groups.iter().enumerate() {
            weights[k] = group.len() as f64 / n as f64;
        }
        let mut means = weighted_means(data, &resp, self.n_components);
        let mut covariances = weighted_covariances(data, &resp, &means);

        for _iter in 0..self.max_iter {
            resp = self.expectation(data, &weights, &means, &covariances)?;

            // M-step.
            let resp_sums: Vec<f64> = (0..self.n_components)
                .map(|k| resp.column(k).sum())
                .collect();
            let total: f64 = resp_sums.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(Error::Other(
                    "gmm responsibilities collapsed to zero mass".to_string(),
                ));
            }
            for k in 0..self.n_components {
                weights[k] = resp_sums[k] / total;
            }
            means = weighted_means(data, &resp, self.n_components);
            covariances = weighted_covariances(data, &resp, &means);
        }

        let labels = (0..n)
            .map(|i| {
                let row = resp.row(i);
                let mut best = 0usize;
                for k in 1..self.n_components {
                    if row[k] > row[best] {
                        best = k;
                    }
                }
                best
            })
            .collect();

        Ok(GmmResult {
            labels,
            responsibilities: resp,
        })
    }

    /// E-step: log-space responsibilities per row, normalized by log-sum-exp.
    fn expectation(
        &self,
        data: &Array2<f32>,
        weights: &Array1<f64>,
        means: &Array2<f64>,
        covariances: &[DMatrix<f64>],
    ) -> Result<Array2<f64>> {
        let n = data.nrows();
        let rows: Vec<Result<Vec<f64>>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut log_probs = vec![0.0f64; self.n_components];
                for k in 0..self.n_components {
                    let log_density =
                        log_multivariate_normal(data, i, means, k, &covariances[k])?;
                    log_probs[k] = weights[k].ln() + log_density;
                }
                let log_sum = logsumexp(&log_probs);
                if !log_sum.is_finite() {
                    return Err(Error::DegenerateGaussian { row: i });
                }
                Ok(log_probs
                    .into_iter()
                    .map(|lp| (lp - log_sum).exp())
                    .collect())
            })
            .collect();

        let mut resp = Array2::<f64>::zeros((n, self.n_components));
        for (i, row) in rows.into_iter().enumerate() {
            for (k, value) in row?.into_iter().enumerate() {
                resp[[i, k]] = value;
            }
        }
        Ok(resp)
    }
}

/// Log-sum-exp for numerical stability.
fn logsumexp(values: &[f64]) -> f64 {
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max_val.is_finite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

/// Log density of row `i` under component `k`, over the subset of dimensions
/// valid in both the row and the mean vector.
fn log_multivariate_normal(
    data: &Array2<f32>,
    i: usize,
    means: &Array2<f64>,
    k: usize,
    covariance: &DMatrix<f64>,
) -> Result<f64> {
    let d = data.ncols();
    let mut valid = Vec::with_capacity(d);
    for j in 0..d {
        let diff = f64::from(data[[i, j]]) - means[[k, j]];
        if !diff.is_nan() {
            valid.push(j);
        }
    }
    if valid.is_empty() {
        return Err(Error::DegenerateGaussian { row: i });
    }

    let m = valid.len();
    let mut subset = DMatrix::<f64>::zeros(m, m);
    for (a, &ja) in valid.iter().enumerate() {
        for (b, &jb) in valid.iter().enumerate() {
            subset[(a, b)] = covariance[(ja, jb)];
        }
    }
    let diff = DVector::<f64>::from_iterator(
        m,
        valid
            .iter()
            .map(|&j| f64::from(data[[i, j]]) - means[[k, j]]),
    );

    let lu = subset.lu();
    let det = lu.determinant();
    if !det.is_finite() || det <= 0.0 {
        return Err(Error::InversionFailed);
    }
    let solved = lu.solve(&diff).ok_or(Error::InversionFailed)?;
    let mahalanobis = diff.dot(&solved);

    Ok(-0.5 * (m as f64 * (2.0 * std::f64::consts::PI).ln() + det.ln() + mahalanobis))
}

/// Responsibility-weighted means, skipping NaN entries per dimension.
/// Dimensions with no valid mass become NaN and drop out of densities.
fn weighted_means(data: &Array2<f32>, resp: &Array2<f64>, n_components: usize) -> Array2<f64> {
    let d = data.ncols();
    let mut sums = Array2::<f64>::zeros((n_components, d));
    let mut mass = Array2::<f64>::zeros((n_components, d));
    for (i, row) in data.rows().into_iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            if val.is_nan() {
                continue;
            }
            for k in 0..n_components {
                let r = resp[[i, k]];
                sums[[k, j]] += r * f64::from(val);
                mass[[k, j]] += r;
            }
        }
    }
    let mut means = Array2::<f64>::from_elem((n_components, d), f64::NAN);
    for k in 0..n_components {
        for j in 0..d {
            if mass[[k, j]] > 1e-10 {
                means[[k, j]] = sums[[k, j]] / mass[[k, j]];
            }
        }
    }
    means
}

/// Responsibility-weighted covariance per component, parallel across
/// dimension pairs, regularized on the diagonal.
fn weighted_covariances(
    data: &Array2<f32>,
    resp: &Array2<f64>,
    means: &Array2<f64>,
) -> Vec<DMatrix<f64>> {
    let n = data.nrows();
    let d = data.ncols();
    let n_components = means.nrows();

    (0..n_components)
        .map(|k| {
            // Row-by-dimension deviations for this component; NaN where the
            // data or the mean is missing.
            let mut diff = Array2::<f64>::zeros((n, d));
            for i in 0..n {
                for j in 0..d {
                    diff[[i, j]] = f64::from(data[[i, j]]) - means[[k, j]];
                }
            }

            let upper: Vec<Vec<f64>> = (0..d)
                .into_par_iter()
                .map(|a| {
                    let mut row = vec![0.0f64; d - a];
                    for (offset, b) in (a..d).enumerate() {
                        let mut accum = 0.0f64;
                        let mut weight = 0.0f64;
                        for i in 0..n {
                            let val = diff[[i, a]] * diff[[i, b]];
                            if !val.is_nan() {
                                accum += resp[[i, k]] * val;
                                weight += resp[[i, k]];
                            }
                        }
                        if weight > 0.0 {
                            row[offset] = accum / weight;
                        }
                    }
                    row
                })
                .collect();

            let mut cov = DMatrix::<f64>::zeros(d, d);
            for (a, row) in upper.iter().enumerate() {
                for (offset, &value) in row.iter().enumerate() {
                    let b = a + offset;
                    cov[(a, b)] = value;
                    cov[(b, a)] = value;
                }
            }
            for j in 0..d {
                cov[(j, j)] += COV_REGULARIZATION;
            }
            cov
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::traits::Clustering;
    use crate::cluster::Kmeans;

    fn blobs() -> Array2<f32> {
        let mut data = Array2::<f32>::zeros((24, 2));
        for i in 0..12 {
            data[[i, 0]] = 0.1 * (i % 4) as f32;
            data[[i, 1]] = 0.1 * (i % 3) as f32;
        }
        for i in 12..24 {
            data[[i, 0]] = 8.0 + 0.1 * (i % 4) as f32;
            data[[i, 1]] = 8.0 + 0.1 * (i % 3) as f32;
        }
        data
    }

    fn seeded_groups(data: &Array2<f32>) -> Vec<Vec<usize>> {
        let partition = Kmeans::new(2).with_seed(42).fit(data).unwrap();
        assert!(partition.is_exact(2));
        partition.groups()
    }

    #[test]
    fn test_gmm_keeps_separated_blobs_apart() {
        let data = blobs();
        let groups = seeded_groups(&data);
        let result = Gmm::new(2).fit_from_partition(&data, &groups).unwrap();
        assert_eq!(result.labels[0], result.labels[11]);
        assert_eq!(result.labels[12], result.labels[23]);
        assert_ne!(result.labels[0], result.labels[12]);
    }

    #[test]
    fn test_responsibilities_sum_to_one() {
        let data = blobs();
        let groups = seeded_groups(&data);
        let result = Gmm::new(2).fit_from_partition(&data, &groups).unwrap();
        for i in 0..data.nrows() {
            let sum: f64 = result.responsibilities.row(i).sum();
            assert!((sum - 1.0).abs() < 1e-9, "row {i} sums to {sum}");
        }
    }

    #[test]
    fn test_gmm_tolerates_missing_entries() {
        let mut data = blobs();
        data[[0, 1]] = f32::NAN;
        data[[20, 0]] = f32::NAN;
        let groups = seeded_groups(&data);
        let result = Gmm::new(2).fit_from_partition(&data, &groups).unwrap();
        assert_ne!(result.labels[0], result.labels[20]);
    }

    #[test]
    fn test_gmm_rejects_group_mismatch() {
        let data = blobs();
        let groups = vec![(0..24).collect::<Vec<_>>()];
        assert!(Gmm::new(2).fit_from_partition(&data, &groups).is_err());
    }

    #[test]
    fn test_all_nan_column_is_degenerate_not_silent() {
        let mut data = blobs();
        for i in 0..24 {
            data[[i, 1]] = f32::NAN;
        }
        let groups = seeded_groups(&data);
        // One dimension survives; the run still succeeds and never emits NaN
        // responsibilities.
        let result = Gmm::new(2).fit_from_partition(&data, &groups).unwrap();
        assert!(result.responsibilities.iter().all(|v| v.is_finite()));
    }
}
