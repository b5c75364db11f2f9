//! Model selection across candidate cluster counts.
//!
//! For each k in the configured range the selector runs one short warm-up
//! attempt plus a fixed number of full-length k-means restarts, each with a
//! fresh seed from the run RNG. Only attempts converging to exactly k
//! non-empty clusters compete; the lowest-WCSS winner is retained together
//! with its AIC (`wcss + 2 d k`) and BIC (`wcss + 0.5 d k ln n`). A GMM can
//! then refine the winner into soft labels.
//!
//! No k is promoted as "the" answer: the full score table goes to the
//! caller, and a k whose restarts all failed simply keeps its infinity
//! sentinel and produces no interval output.

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::cluster::{score_partition, Clustering, Gmm, Kmeans, Partition};
use crate::config::RunConfig;
use crate::error::Result;
use crate::export::ClusterScores;

/// Iteration cap for the warm-up attempt preceding the full restarts.
const WARMUP_MAX_ITERS: usize = 100;

/// Winning result for one candidate cluster count.
#[derive(Debug)]
pub struct SelectedModel {
    /// The winning partition.
    pub partition: Partition,
    /// Row labels with degenerate-cluster members withheld.
    pub labels: Vec<Option<usize>>,
    /// Soft labels from the GMM refinement, when it ran and succeeded.
    pub gmm_labels: Option<Vec<usize>>,
}

/// All per-k outcomes of one model-selection sweep.
#[derive(Debug)]
pub struct ModelSelection {
    /// One score row per candidate k, including failed ones.
    pub table: Vec<ClusterScores>,
    /// Winning models keyed by k; absent when every restart failed.
    pub models: BTreeMap<usize, SelectedModel>,
}

/// Runs the per-k restart loop.
pub struct ModelSelector<'a> {
    config: &'a RunConfig,
    rng: StdRng,
}

impl<'a> ModelSelector<'a> {
    /// Selector seeded from the run RNG stream.
    pub fn new(config: &'a RunConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sweep every candidate k over `data`.
    pub fn run(&mut self, data: &Array2<f32>) -> Result<ModelSelection> {
        let num_rows = data.nrows();
        let dimensionality = data.ncols();
        let mut table = Vec::new();
        let mut models = BTreeMap::new();

        for k in self.config.candidate_ks() {
            if k > num_rows {
                warn!(k, num_rows, "more clusters than rows; skipping");
                table.push(ClusterScores {
                    num_clusters: k,
                    wcss: f64::INFINITY,
                    aic: f64::INFINITY,
                    bic: f64::INFINITY,
                });
                continue;
            }
            let mut best_wcss = f64::INFINITY;
            let mut best: Option<SelectedModel> = None;

            let attempts = std::iter::once(WARMUP_MAX_ITERS).chain(
                std::iter::repeat(self.config.kmeans_max_iters).take(self.config.num_attempts),
            );
            for max_iters in attempts {
                let seed = self.rng.random::<u64>();
                let partition = Kmeans::new(k)
                    .with_max_iter(max_iters)
                    .with_seed(seed)
                    .fit(data)?;
                if !partition.is_exact(k) {
                    debug!(
                        k,
                        actual = partition.clusters.len(),
                        converged = partition.converged,
                        "attempt discarded"
                    );
                    continue;
                }
                let score = score_partition(&partition, data);
                if score.wcss < best_wcss {
                    best_wcss = score.wcss;
                    best = Some(SelectedModel {
                        partition,
                        labels: score.labels,
                        gmm_labels: None,
                    });
                }
            }

            match best {
                Some(mut model) => {
                    if self.config.run_gmm {
                        model.gmm_labels = self.refine_with_gmm(data, k, &model.partition);
                    }
                    table.push(scores_for(
                        k,
                        best_wcss,
                        dimensionality,
                        num_rows,
                    ));
                    info!(k, wcss = best_wcss, "retained best attempt");
                    models.insert(k, model);
                }
                None => {
                    warn!(k, "no attempt converged to exactly k clusters");
                    table.push(ClusterScores {
                        num_clusters: k,
                        wcss: f64::INFINITY,
                        aic: f64::INFINITY,
                        bic: f64::INFINITY,
                    });
                }
            }
        }

        Ok(ModelSelection { table, models })
    }

    /// GMM refinement is best-effort: degeneracy is logged and skipped.
    fn refine_with_gmm(
        &mut self,
        data: &Array2<f32>,
        k: usize,
        partition: &Partition,
    ) -> Option<Vec<usize>> {
        let gmm = Gmm::new(k).with_max_iter(self.config.gmm_max_iters);
        match gmm.fit_from_partition(data, &partition.groups()) {
            Ok(result) => Some(result.labels),
            Err(e) => {
                warn!(k, error = %e, "gmm refinement skipped");
                None
            }
        }
    }
}

fn scores_for(k: usize, wcss: f64, dimensionality: usize, num_rows: usize) -> ClusterScores {
    let d = dimensionality as f64;
    let kf = k as f64;
    ClusterScores {
        num_clusters: k,
        wcss,
        aic: wcss + 2.0 * d * kf,
        bic: wcss + 0.5 * d * kf * (num_rows as f64).ln(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn blobs(k: usize, per_cluster: usize) -> Array2<f32> {
        let mut data = Array2::<f32>::zeros((k * per_cluster, 3));
        for c in 0..k {
            for i in 0..per_cluster {
                let row = c * per_cluster + i;
                for j in 0..3 {
                    data[[row, j]] = 30.0 * c as f32 + 0.05 * i as f32 + j as f32;
                }
            }
        }
        data
    }

    fn config() -> RunConfig {
        let mut config = RunConfig::new(100, "out");
        config.starting_k = 2;
        config.num_k_values = 3;
        config.num_attempts = 4;
        config.run_gmm = false;
        config
    }

    #[test]
    fn test_table_covers_every_k() {
        let data = blobs(3, 10);
        let config = config();
        let mut selector = ModelSelector::new(&config, 11);
        let selection = selector.run(&data).unwrap();
        assert_eq!(selection.table.len(), 3);
        let ks: Vec<usize> = selection.table.iter().map(|s| s.num_clusters).collect();
        assert_eq!(ks, vec![2, 3, 4]);
    }

    #[test]
    fn test_retained_wcss_is_minimum_over_restarts() {
        let data = blobs(3, 10);
        let config = config();
        let mut selector = ModelSelector::new(&config, 5);
        let selection = selector.run(&data).unwrap();
        // Re-run the same seeds manually and confirm nothing beat the table.
        let mut rng = StdRng::seed_from_u64(5);
        for scores in &selection.table {
            let k = scores.num_clusters;
            let attempts =
                std::iter::once(WARMUP_MAX_ITERS).chain(std::iter::repeat(200).take(4));
            for max_iters in attempts {
                let seed = rng.random::<u64>();
                let partition = Kmeans::new(k)
                    .with_max_iter(max_iters)
                    .with_seed(seed)
                    .fit(&data)
                    .unwrap();
                if partition.is_exact(k) {
                    let wcss = score_partition(&partition, &data).wcss;
                    assert!(wcss >= scores.wcss - 1e-9, "k={k}: {wcss} < {}", scores.wcss);
                }
            }
        }
    }

    #[test]
    fn test_aic_bic_formulas() {
        let scores = scores_for(4, 10.0, 6, 100);
        assert!((scores.aic - (10.0 + 2.0 * 6.0 * 4.0)).abs() < 1e-12);
        assert!((scores.bic - (10.0 + 0.5 * 6.0 * 4.0 * (100.0f64).ln())).abs() < 1e-12);
    }

    #[test]
    fn test_failed_k_keeps_sentinel_and_no_model() {
        // 6 rows cannot support k = 5 with the 5-member floor, and barely
        // support larger k at all; k = 5 on 2-blob data should fail often.
        let data = blobs(2, 3);
        let mut config = config();
        config.starting_k = 5;
        config.num_k_values = 1;
        config.num_attempts = 2;
        let mut selector = ModelSelector::new(&config, 3);
        let selection = selector.run(&data).unwrap();
        let scores = &selection.table[0];
        if !selection.models.contains_key(&5) {
            assert!(scores.wcss.is_infinite());
            assert!(scores.aic.is_infinite());
        }
    }

    #[test]
    fn test_gmm_refinement_attached() {
        let data = blobs(2, 12);
        let mut config = config();
        config.num_k_values = 1;
        config.run_gmm = true;
        let mut selector = ModelSelector::new(&config, 21);
        let selection = selector.run(&data).unwrap();
        let model = selection.models.get(&2).expect("k=2 should converge");
        let gmm_labels = model.gmm_labels.as_ref().expect("gmm should run");
        assert_eq!(gmm_labels.len(), data.nrows());
    }
}
