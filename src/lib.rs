//! # hiclust
//!
//! Genome-wide subcompartment discovery from Hi-C contact maps.
//!
//! Given normalized contact records, `hiclust` filters unusable bins,
//! compresses each chromosome's column space by correlation reordering,
//! assembles a composite genome-wide interaction matrix, cleans and z-scores
//! it, then sweeps k-means (with optional Gaussian-mixture refinement)
//! across a range of cluster counts, emitting labeled genomic intervals and
//! a WCSS/AIC/BIC score table per candidate count.
//!
//! The crate does not read Hi-C container files. Callers adapt their I/O
//! layer to the [`dataset::ContactSource`] trait and hand the pipeline a
//! [`config::RunConfig`]:
//!
//! ```no_run
//! use hiclust::config::RunConfig;
//! use hiclust::dataset::DenseSource;
//! use hiclust::genome::Chromosome;
//! use hiclust::pipeline::Pipeline;
//!
//! # fn main() -> hiclust::Result<()> {
//! let chromosomes = vec![
//!     Chromosome::new(0, "chr1", 248_956_422),
//!     Chromosome::new(1, "chr2", 242_193_529),
//! ];
//! let source = DenseSource::new(chromosomes);
//! // ... populate the source from your reader ...
//! let config = RunConfig::new(100_000, "out");
//! let mut pipeline = Pipeline::new(config, &[&source])?;
//! pipeline.extract_subcompartments("gw")?;
//! # Ok(())
//! # }
//! ```

pub mod cleaning;
pub mod cluster;
pub mod config;
pub mod dataset;
/// Error types used across `hiclust`.
pub mod error;
pub mod export;
pub mod genome;
pub mod matrix;
pub mod pipeline;
pub mod select;
pub mod similarity;

pub use cluster::{Cluster, Clustering, Gmm, Kmeans, Partition};
pub use config::RunConfig;
pub use error::{Error, Result};
pub use export::SubcompartmentInterval;
pub use pipeline::Pipeline;
pub use similarity::{MetricKind, SimilarityMetric};
