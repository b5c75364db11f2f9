//! Clustering traits.

use ndarray::Array2;

use crate::cluster::Partition;
use crate::error::Result;

/// Trait for hard clustering algorithms over NaN-tolerant row matrices.
pub trait Clustering {
    /// Fit the model to data and return the resulting partition.
    fn fit(&self, data: &Array2<f32>) -> Result<Partition>;

    /// Get the requested number of clusters.
    fn n_clusters(&self) -> usize;
}
