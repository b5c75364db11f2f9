//! Run configuration.
//!
//! One `RunConfig` is built per pipeline run and threaded explicitly through
//! every constructor that needs it. There is no process-wide mutable state;
//! verbosity is the caller's `tracing` subscriber level.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::similarity::MetricKind;

/// Optional similarity-scoring stage configuration.
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Metric used to score rows against each other or against centroids.
    pub metric: MetricKind,
    /// Rows per generated centroid; values above 1 switch the scorer to the
    /// asymmetric N x K form with K = N / num_per_centroid.
    pub num_per_centroid: usize,
}

/// Configuration for one subcompartment-calling run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Bin width in base pairs.
    pub resolution: u32,
    /// Normalization vector name understood by the contact source, e.g.
    /// `NONE`, `VC`, `KR`.
    pub normalization: String,
    /// Seed for every stochastic step of the run.
    pub seed: u64,
    /// Independent k-means restarts per candidate cluster count.
    pub num_attempts: usize,
    /// Smallest candidate cluster count.
    pub starting_k: usize,
    /// Number of candidate cluster counts, starting at `starting_k`.
    pub num_k_values: usize,
    /// Original bins merged into one compressed column; 1 disables the
    /// correlation reordering.
    pub num_columns_to_join: usize,
    /// Similarity-scoring stage; `None` clusters the cleaned matrix directly.
    pub similarity: Option<SimilarityConfig>,
    /// Column z-scores above this become NaN during cleaning.
    pub zscore_threshold: f32,
    /// A bin is bad when more than this fraction of its row is missing.
    pub sparsity_threshold: f32,
    /// Iteration cap for each k-means attempt.
    pub kmeans_max_iters: usize,
    /// Iteration count for the GMM refinement.
    pub gmm_max_iters: usize,
    /// Refine each winning k-means partition with a GMM.
    pub run_gmm: bool,
    /// Dump intermediate matrices next to the interval output.
    pub save_intermediates: bool,
    /// Directory receiving BED files, score tables and matrix dumps.
    pub output_directory: PathBuf,
}

impl RunConfig {
    /// Defaults mirror a genome-wide run at 100 kb.
    pub fn new(resolution: u32, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            resolution,
            normalization: "KR".to_string(),
            seed: 0,
            num_attempts: 3,
            starting_k: 2,
            num_k_values: 10,
            num_columns_to_join: 2,
            similarity: None,
            zscore_threshold: 3.0,
            sparsity_threshold: 0.5,
            kmeans_max_iters: 200,
            gmm_max_iters: 20,
            run_gmm: true,
            save_intermediates: false,
            output_directory: output_directory.into(),
        }
    }

    /// Check the configuration before the pipeline starts.
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(Error::InvalidParameter {
                name: "resolution",
                message: "must be a positive bin width in bp",
            });
        }
        if self.starting_k < 2 {
            return Err(Error::InvalidParameter {
                name: "starting_k",
                message: "must be at least 2",
            });
        }
        if self.num_k_values == 0 {
            return Err(Error::InvalidParameter {
                name: "num_k_values",
                message: "must cover at least one cluster count",
            });
        }
        if self.num_attempts == 0 {
            return Err(Error::InvalidParameter {
                name: "num_attempts",
                message: "must allow at least one restart",
            });
        }
        if self.num_columns_to_join == 0 {
            return Err(Error::InvalidParameter {
                name: "num_columns_to_join",
                message: "must be at least 1",
            });
        }
        if !(0.0..=1.0).contains(&self.sparsity_threshold) {
            return Err(Error::InvalidParameter {
                name: "sparsity_threshold",
                message: "must be a fraction in [0, 1]",
            });
        }
        if self.zscore_threshold <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "zscore_threshold",
                message: "must be positive",
            });
        }
        if let Some(sim) = &self.similarity {
            if sim.num_per_centroid == 0 {
                return Err(Error::InvalidParameter {
                    name: "num_per_centroid",
                    message: "must be at least 1",
                });
            }
        }
        Ok(())
    }

    /// Candidate cluster counts covered by the model-selection loop.
    pub fn candidate_ks(&self) -> impl Iterator<Item = usize> {
        self.starting_k..self.starting_k + self.num_k_values
    }
}
