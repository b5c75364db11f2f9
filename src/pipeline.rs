//! Pipeline orchestration.
//!
//! Wires the stages together for one run: sparsity filtering, per-dataset
//! reordering and assembly, column-wise dataset concatenation, cleanup,
//! optional similarity scoring, then the model-selection sweep and export.
//! The composite matrix and bad-index set are built once and read-only from
//! then on; every stochastic stage draws its seed from one run RNG, so a
//! fixed `RunConfig::seed` reproduces the whole run.

use std::collections::BTreeMap;
use std::fs;

use ndarray::Array2;
use rand::prelude::*;
use tracing::info;

use crate::cleaning::{BadIndexFinder, BadIndexSet, IndexOrderer, MatrixCleaner};
use crate::config::RunConfig;
use crate::dataset::ContactSource;
use crate::error::{Error, Result};
use crate::export::{self, SubcompartmentInterval};
use crate::genome::Chromosome;
use crate::matrix::{CompositeMatrix, MatrixAssembler};
use crate::select::{ModelSelection, ModelSelector};
use crate::similarity::SimilarityScorer;

/// One configured subcompartment-calling run.
pub struct Pipeline {
    config: RunConfig,
    chromosomes: Vec<Chromosome>,
    bad: BadIndexSet,
    composite: CompositeMatrix,
    clustering_input: Array2<f32>,
    rng: StdRng,
}

impl Pipeline {
    /// Build the cleaned, clusterable matrix from one or more datasets.
    ///
    /// All datasets must expose the same chromosomes; the first dataset
    /// defines the row basis and each additional dataset appends columns.
    pub fn new<S: ContactSource>(config: RunConfig, sources: &[&S]) -> Result<Self> {
        config.validate()?;
        if sources.is_empty() {
            return Err(Error::EmptyInput);
        }
        let chromosomes = sources[0].chromosomes().to_vec();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let finder = BadIndexFinder::new(config.sparsity_threshold);
        let bad = finder.find(
            sources,
            &chromosomes,
            config.resolution,
            &config.normalization,
        )?;

        let assembler = MatrixAssembler::new(
            &chromosomes,
            config.resolution,
            config.normalization.clone(),
            config.num_columns_to_join,
            &bad,
        );

        let multi_dataset = sources.len() > 1;
        let mut composite: Option<CompositeMatrix> = None;
        for &source in sources {
            let orderer = if config.num_columns_to_join > 1 {
                Some(IndexOrderer::new(
                    source,
                    &chromosomes,
                    config.resolution,
                    &config.normalization,
                    config.num_columns_to_join,
                    &bad,
                    rng.random(),
                )?)
            } else {
                None
            };
            let mut built = assembler.assemble(source, orderer.as_ref())?;
            if multi_dataset {
                built.zscore_columns();
            }
            composite = Some(match composite.take() {
                None => built,
                Some(mut existing) => {
                    existing.append_columns(built)?;
                    existing
                }
            });
        }
        let mut composite = composite.ok_or(Error::EmptyInput)?;

        // Cleanup operates on the matrix and must keep the row map aligned.
        let cleaner = MatrixCleaner::new(config.zscore_threshold);
        let weights = composite.weights().to_vec();
        let (data, row_map) = composite.parts_mut();
        let cleaned = cleaner.clean(data.clone(), row_map, &weights)?;
        composite.replace_data(cleaned);

        let clustering_input = match &config.similarity {
            Some(sim) => {
                let scorer = SimilarityScorer::new(sim.metric.metric(), sim.num_per_centroid);
                scorer.score(composite.data(), rng.random())?
            }
            None => composite.data().clone(),
        };

        info!(
            rows = clustering_input.nrows(),
            cols = clustering_input.ncols(),
            datasets = sources.len(),
            "pipeline input ready"
        );

        Ok(Self {
            config,
            chromosomes,
            bad,
            composite,
            clustering_input,
            rng,
        })
    }

    /// Chromosomes of the run.
    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    /// The genome-wide exclusion set.
    pub fn bad_indices(&self) -> &BadIndexSet {
        &self.bad
    }

    /// The cleaned composite matrix.
    pub fn composite(&self) -> &CompositeMatrix {
        &self.composite
    }

    /// The matrix handed to the clustering engines.
    pub fn clustering_input(&self) -> &Array2<f32> {
        &self.clustering_input
    }

    /// Run model selection and write every per-k result.
    ///
    /// Output files land in the configured directory: one interval file per
    /// converged k for k-means (and for the GMM refinement when it ran), the
    /// per-k score table, and optional matrix dumps.
    pub fn extract_subcompartments(&mut self, prefix: &str) -> Result<ModelSelection> {
        let out = self.config.output_directory.clone();
        fs::create_dir_all(&out)?;

        let mut selector = ModelSelector::new(&self.config, self.rng.random());
        let selection = selector.run(&self.clustering_input)?;

        for (&k, model) in &selection.models {
            let mut intervals =
                export::intervals_from_labels(self.composite.row_map(), &model.labels);
            export::collapse(&mut intervals);
            let path = out.join(format!("{prefix}_{k}_kmeans_clusters.bed"));
            export::write_intervals(&path, &intervals)?;

            if let Some(gmm_labels) = &model.gmm_labels {
                let labeled: Vec<Option<usize>> =
                    gmm_labels.iter().map(|&label| Some(label)).collect();
                let mut intervals =
                    export::intervals_from_labels(self.composite.row_map(), &labeled);
                export::collapse(&mut intervals);
                let path = out.join(format!("{prefix}_{k}_gmm_clusters.bed"));
                export::write_intervals(&path, &intervals)?;
            }
        }

        export::write_score_table(
            &out.join(format!("{prefix}_cluster_size_wcss_aic_bic.tsv")),
            &selection.table,
        )?;

        if self.config.save_intermediates {
            export::write_matrix(&out.join(format!("{prefix}_cleaned_matrix.tsv")), self.composite.data())?;
            export::write_matrix(
                &out.join(format!("{prefix}_clustering_input.tsv")),
                &self.clustering_input,
            )?;
        }

        info!(models = selection.models.len(), "subcompartments extracted");
        Ok(selection)
    }

    /// Intervals for one winning k without touching the filesystem.
    pub fn intervals_for(
        &self,
        selection: &ModelSelection,
        k: usize,
    ) -> Option<Vec<SubcompartmentInterval>> {
        let model = selection.models.get(&k)?;
        let mut intervals = export::intervals_from_labels(self.composite.row_map(), &model.labels);
        export::collapse(&mut intervals);
        Some(intervals)
    }

    /// Row interval map of the cleaned matrix.
    pub fn row_map(&self) -> &BTreeMap<usize, SubcompartmentInterval> {
        self.composite.row_map()
    }
}
