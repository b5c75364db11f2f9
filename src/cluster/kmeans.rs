//! K-means clustering over rows with missing data.
//!
//! Partitions genome-wide rows into k clusters by minimizing
//! **within-cluster sum of squares** (WCSS) with Lloyd's algorithm, adapted
//! for the NaN-heavy composite matrix:
//!
//! - Distances are computed only over dimensions valid in both the row and
//!   the centroid, rescaled by the valid fraction so rows with different
//!   missingness stay comparable (mean imputation per comparison).
//! - Centroid dimensions with no valid member entry become NaN and drop out
//!   of later comparisons.
//! - Empty clusters are never reseeded. A run counts as usable only when the
//!   assignments stabilize within the iteration cap *and* exactly k clusters
//!   remain non-empty; the model-selection loop discards everything else.
//!
//! Scoring treats clusters with fewer than 5 members as degenerate: their
//! members are flagged instead of labeled and the attempt's WCSS absorbs a
//! maximal penalty, which keeps model selection from rewarding splinters.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

use crate::cluster::traits::Clustering;
use crate::error::{Error, Result};
use crate::similarity::RobustEuclidean;

/// Clusters below this size are degenerate for scoring purposes.
const MIN_CLUSTER_SIZE: usize = 5;

/// One cluster: its center and the rows it owns. Produced fresh by each
/// attempt and never mutated after scoring.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Per-dimension mean of the member rows; NaN where no member had data.
    pub center: Vec<f32>,
    /// Row indices belonging to this cluster.
    pub members: Vec<usize>,
}

/// Outcome of one k-means attempt.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Non-empty clusters, in centroid order.
    pub clusters: Vec<Cluster>,
    /// Cluster index per row (position in `clusters`).
    pub labels: Vec<usize>,
    /// Whether assignments stabilized within the iteration cap.
    pub converged: bool,
    /// Iterations actually run.
    pub iterations: usize,
}

impl Partition {
    /// Whether this attempt produced exactly the requested cluster count.
    pub fn is_exact(&self, k: usize) -> bool {
        self.converged && self.clusters.len() == k
    }

    /// Member index lists per cluster, for seeding the GMM.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        self.clusters.iter().map(|c| c.members.clone()).collect()
    }
}

/// WCSS of a partition with the degenerate-cluster penalty applied.
#[derive(Debug, Clone)]
pub struct PartitionScore {
    /// Penalized within-cluster sum of squares, averaged over good clusters.
    pub wcss: f64,
    /// Row labels; members of degenerate clusters carry None.
    pub labels: Vec<Option<usize>>,
    /// Number of clusters meeting the size floor.
    pub num_good_clusters: usize,
}

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct Kmeans {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Random seed.
    seed: Option<u64>,
}

impl Kmeans {
    /// Create a new K-means clusterer.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 200,
            seed: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Initialize centroids with k-means++ over the robust distance.
    fn init_centroids(&self, data: &ArrayView2<'_, f32>, rng: &mut impl Rng) -> Array2<f32> {
        let n = data.nrows();
        let d = data.ncols();
        let mut centroids = Array2::zeros((self.k, d));

        // First centroid: random point.
        let first = rng.random_range(0..n);
        centroids.row_mut(0).assign(&data.row(first));

        // Remaining centroids: sample proportional to squared distance to
        // the nearest chosen centroid.
        for i in 1..self.k {
            let mut distances: Vec<f32> = Vec::with_capacity(n);
            for j in 0..n {
                let point = data.row(j);
                let min_dist = (0..i)
                    .map(|c| Self::distance(point, centroids.row(c)))
                    .filter(|v| !v.is_nan())
                    .fold(f32::MAX, f32::min);
                distances.push(if min_dist == f32::MAX { 0.0 } else { min_dist });
            }

            let total: f32 = distances.iter().sum();
            if total == 0.0 {
                let idx = rng.random_range(0..n);
                centroids.row_mut(i).assign(&data.row(idx));
                continue;
            }

            let threshold = rng.random::<f32>() * total;
            let mut cumsum = 0.0;
            let mut selected = 0;
            for (j, &dist) in distances.iter().enumerate() {
                cumsum += dist;
                if cumsum >= threshold {
                    selected = j;
                    break;
                }
            }
            centroids.row_mut(i).assign(&data.row(selected));
        }

        centroids
    }

    /// Squared distance over shared valid dimensions, rescaled to the full
    /// dimensionality.
    fn distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        RobustEuclidean::non_nan_mse(a, b) * a.len() as f32
    }
}

impl Clustering for Kmeans {
    fn fit(&self, data: &Array2<f32>) -> Result<Partition> {
        let n = data.nrows();
        let d = data.ncols();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput);
        }
        if self.k > n || self.k == 0 {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: n,
            });
        }

        let mut rng: StdRng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        let data_view = data.view();
        let mut centroids = self.init_centroids(&data_view, &mut rng);
        let mut labels = vec![0usize; n];
        let mut converged = false;
        let mut iterations = 0usize;

        for _iter in 0..self.max_iter {
            iterations += 1;

            // Assignment step.
            let mut changed = 0usize;
            for (i, label) in labels.iter_mut().enumerate() {
                let point = data.row(i);
                let mut best_cluster = *label;
                let mut best_dist = f32::MAX;
                for c in 0..self.k {
                    let dist = Self::distance(point, centroids.row(c));
                    if !dist.is_nan() && dist < best_dist {
                        best_dist = dist;
                        best_cluster = c;
                    }
                }
                if best_cluster != *label {
                    *label = best_cluster;
                    changed += 1;
                }
            }

            // Update step: per-dimension mean over valid member entries.
            let mut sums = Array2::<f64>::zeros((self.k, d));
            let mut counts = Array2::<usize>::zeros((self.k, d));
            for (i, &label) in labels.iter().enumerate() {
                for (j, &val) in data.row(i).iter().enumerate() {
                    if !val.is_nan() {
                        sums[[label, j]] += f64::from(val);
                        counts[[label, j]] += 1;
                    }
                }
            }
            for c in 0..self.k {
                for j in 0..d {
                    centroids[[c, j]] = if counts[[c, j]] > 0 {
                        (sums[[c, j]] / counts[[c, j]] as f64) as f32
                    } else {
                        f32::NAN
                    };
                }
            }

            if changed == 0 {
                converged = true;
                break;
            }
        }

        // Collect non-empty clusters; empty ones simply disappear and the
        // caller decides whether the attempt still counts.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.k];
        for (i, &label) in labels.iter().enumerate() {
            members[label].push(i);
        }
        let mut clusters = Vec::new();
        let mut remap = vec![usize::MAX; self.k];
        for (c, member_list) in members.into_iter().enumerate() {
            if member_list.is_empty() {
                continue;
            }
            remap[c] = clusters.len();
            clusters.push(Cluster {
                center: centroids.row(c).to_vec(),
                members: member_list,
            });
        }
        let labels = labels.into_iter().map(|label| remap[label]).collect();

        Ok(Partition {
            clusters,
            labels,
            converged,
            iterations,
        })
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}

/// Score a partition: valid-pair mean squared error per member row, plus a
/// maximal penalty per degenerate cluster, averaged over the good-cluster
/// count.
///
/// Members of degenerate clusters still contribute their true error; only
/// their labels are withheld. The penalty is not normalized across cluster
/// counts, so AIC/BIC comparisons between counts inherit it.
pub fn score_partition(partition: &Partition, data: &Array2<f32>) -> PartitionScore {
    let mut wcss = 0.0f64;
    let mut num_good_clusters = 0usize;
    let mut labels: Vec<Option<usize>> = vec![None; data.nrows()];

    for (c, cluster) in partition.clusters.iter().enumerate() {
        let degenerate = cluster.members.len() < MIN_CLUSTER_SIZE;
        if degenerate {
            wcss += f64::from(f32::MAX);
        } else {
            num_good_clusters += 1;
        }
        let center = ndarray::ArrayView1::from(cluster.center.as_slice());
        for &row in &cluster.members {
            let mse = RobustEuclidean::non_nan_mse(center, data.row(row));
            if !mse.is_nan() {
                wcss += f64::from(mse);
            }
            if !degenerate {
                labels[row] = Some(c);
            }
        }
    }

    let wcss = wcss / num_good_clusters as f64;
    PartitionScore {
        wcss,
        labels,
        num_good_clusters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> Array2<f32> {
        let mut data = Array2::<f32>::zeros((20, 3));
        for i in 0..10 {
            for j in 0..3 {
                data[[i, j]] = 0.05 * i as f32 + j as f32;
            }
        }
        for i in 10..20 {
            for j in 0..3 {
                data[[i, j]] = 50.0 + 0.05 * i as f32 - j as f32;
            }
        }
        data
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let data = blobs();
        let partition = Kmeans::new(2).with_seed(42).fit(&data).unwrap();
        assert!(partition.is_exact(2));
        assert_eq!(partition.labels[0], partition.labels[9]);
        assert_eq!(partition.labels[10], partition.labels[19]);
        assert_ne!(partition.labels[0], partition.labels[10]);
    }

    #[test]
    fn test_kmeans_deterministic_with_seed() {
        let data = blobs();
        let a = Kmeans::new(2).with_seed(7).fit(&data).unwrap();
        let b = Kmeans::new(2).with_seed(7).fit(&data).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_kmeans_handles_nan_rows() {
        let mut data = blobs();
        data[[0, 1]] = f32::NAN;
        data[[15, 0]] = f32::NAN;
        let partition = Kmeans::new(2).with_seed(3).fit(&data).unwrap();
        assert!(partition.is_exact(2));
        assert_eq!(partition.labels[0], partition.labels[5]);
    }

    #[test]
    fn test_all_nan_column_absent_from_centers() {
        let mut data = blobs();
        for i in 0..20 {
            data[[i, 2]] = f32::NAN;
        }
        let partition = Kmeans::new(2).with_seed(5).fit(&data).unwrap();
        for cluster in &partition.clusters {
            assert!(cluster.center[2].is_nan());
        }
    }

    #[test]
    fn test_kmeans_rejects_bad_k() {
        let data = array![[0.0f32, 1.0], [1.0, 0.0]];
        assert!(Kmeans::new(5).fit(&data).is_err());
        assert!(Kmeans::new(0).fit(&data).is_err());
    }

    #[test]
    fn test_score_penalizes_tiny_clusters() {
        let data = blobs();
        let partition = Partition {
            clusters: vec![
                Cluster {
                    center: vec![1.0, 2.0, 3.0],
                    members: (0..10).collect(),
                },
                Cluster {
                    center: vec![50.0, 50.0, 50.0],
                    members: (10..17).collect(),
                },
                Cluster {
                    center: vec![0.0, 0.0, 0.0],
                    members: (17..20).collect(),
                },
            ],
            labels: Vec::new(),
            converged: true,
            iterations: 1,
        };
        let score = score_partition(&partition, &data);
        assert_eq!(score.num_good_clusters, 2);
        assert!(score.wcss > f64::from(f32::MAX) / 2.0);
        for row in 17..20 {
            assert_eq!(score.labels[row], None);
        }
        assert!(score.labels[0].is_some());
    }

    #[test]
    fn test_requesting_more_clusters_than_structure() {
        // Three tight groups; k = 5 should rarely keep 5 non-empty clusters.
        let mut data = Array2::<f32>::zeros((30, 2));
        for i in 0..30 {
            let group = i / 10;
            data[[i, 0]] = group as f32 * 100.0;
            data[[i, 1]] = group as f32 * 100.0 + (i % 10) as f32 * 0.01;
        }
        let mut exact = 0usize;
        for seed in 0..12 {
            let partition = Kmeans::new(5).with_seed(seed).fit(&data).unwrap();
            if partition.is_exact(5) {
                exact += 1;
            }
        }
        assert!(
            exact < 12,
            "every restart converged to 5 clusters on 3-cluster data"
        );
    }
}
