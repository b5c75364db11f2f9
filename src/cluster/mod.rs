//! Clustering engines for the genome-wide composite matrix.
//!
//! ## Hard then soft
//!
//! The pipeline clusters in two stages. K-means provides the workhorse hard
//! partition: it is cheap enough to restart many times per candidate cluster
//! count, and the model-selection loop keeps only attempts that converge to
//! exactly the requested number of non-empty clusters.
//!
//! The Gaussian mixture then refines a winning partition into soft
//! assignments. It is deliberately *not* randomly initialized; EM started
//! from random means on this data routinely collapses components, while the
//! k-means seed starts every component with real mass.
//!
//! Both engines treat NaN as missing data, not as a numeric error: distances
//! and densities are evaluated over the dimensions that are actually present
//! for each comparison.

mod gmm;
mod kmeans;
mod traits;

pub use gmm::{Gmm, GmmResult};
pub use kmeans::{score_partition, Cluster, Kmeans, Partition, PartitionScore};
pub use traits::Clustering;
