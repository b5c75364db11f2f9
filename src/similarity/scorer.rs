//! Row similarity scoring.
//!
//! Transforms the cleaned composite matrix into a similarity space before
//! clustering. Two shapes exist: an all-pairs symmetric N×N matrix when the
//! metric is symmetric and no centroid compression was requested, and an
//! asymmetric N×K matrix against K generated centroids otherwise. Rows are
//! independent, so scoring parallelizes across the rayon pool; each worker
//! takes the next unclaimed row. The scored columns are z-scored afterwards
//! so heterogeneous interaction scales do not bias clustering.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cleaning::QuickCentroids;
use crate::error::{Error, Result};
use crate::matrix::ops;
use crate::similarity::metrics::SimilarityMetric;

/// Scores rows against each other or against generated centroids.
pub struct SimilarityScorer<'m> {
    metric: &'m dyn SimilarityMetric,
    num_per_centroid: usize,
}

impl<'m> SimilarityScorer<'m> {
    /// `num_per_centroid` above 1 compresses the column basis to
    /// `rows / num_per_centroid` centroids.
    pub fn new(metric: &'m dyn SimilarityMetric, num_per_centroid: usize) -> Self {
        Self {
            metric,
            num_per_centroid,
        }
    }

    /// Score every row of `data`. The seed drives centroid generation only.
    pub fn score(&self, data: &Array2<f32>, seed: u64) -> Result<Array2<f32>> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        if self.metric.is_symmetric() && self.num_per_centroid <= 1 {
            self.score_symmetric(data)
        } else {
            self.score_against_centroids(data, seed)
        }
    }

    fn score_symmetric(&self, data: &Array2<f32>) -> Result<Array2<f32>> {
        let n = data.nrows();
        // Upper triangle rows in parallel, mirrored afterwards.
        let triangles: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (i..n)
                    .map(|j| self.metric.distance(data.row(i), data.row(j)))
                    .collect()
            })
            .collect();

        let mut result = Array2::<f32>::zeros((n, n));
        for (i, triangle) in triangles.iter().enumerate() {
            for (offset, &value) in triangle.iter().enumerate() {
                let j = i + offset;
                result[[i, j]] = value;
                result[[j, i]] = value;
            }
        }

        // One shared batch keeps the normalized matrix exactly symmetric.
        ops::zscore_columns(&mut result, n);
        Ok(result)
    }

    fn score_against_centroids(&self, data: &Array2<f32>, seed: u64) -> Result<Array2<f32>> {
        let n = data.nrows();
        let (centroids, weights) = if self.num_per_centroid > 1 {
            let planned = (n / self.num_per_centroid).max(1);
            let (centroids, weights) =
                QuickCentroids::new(data.view(), planned, seed).generate();
            if centroids.nrows() != planned {
                debug!(
                    planned,
                    actual = centroids.nrows(),
                    "centroid compression fell short of plan"
                );
            }
            (centroids, weights)
        } else {
            (data.clone(), vec![1usize; n])
        };
        if centroids.nrows() == 0 {
            return Err(Error::EmptyInput);
        }

        let k = centroids.nrows();
        let rows: Vec<Vec<f32>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..k)
                    .map(|c| self.metric.distance(centroids.row(c), data.row(i)))
                    .collect()
            })
            .collect();

        let mut result = Array2::<f32>::zeros((n, k));
        let mut nan_scores = 0usize;
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if value.is_nan() {
                    nan_scores += 1;
                }
                result[[i, j]] = value;
            }
        }
        if nan_scores > 0 {
            warn!(nan_scores, "similarity scores with no shared dimensions");
        }

        ops::zscore_columns_weighted(&mut result, &weights)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::metrics::{RobustCorrelation, RobustEuclidean};
    use ndarray::Array2;

    fn sample_data() -> Array2<f32> {
        let mut data = Array2::<f32>::zeros((12, 6));
        for i in 0..12 {
            for j in 0..6 {
                let base = if i < 6 { 1.0 } else { -1.0 };
                data[[i, j]] = base * (j as f32 + 1.0) + 0.01 * i as f32;
            }
        }
        data
    }

    #[test]
    fn test_symmetric_mode_is_symmetric() {
        let data = sample_data();
        let scorer = SimilarityScorer::new(&RobustCorrelation, 1);
        let scored = scorer.score(&data, 0).unwrap();
        assert_eq!(scored.dim(), (12, 12));
        for i in 0..12 {
            for j in 0..12 {
                assert_eq!(scored[[i, j]], scored[[j, i]], "asymmetry at {i},{j}");
            }
        }
    }

    #[test]
    fn test_centroid_mode_shape() {
        let data = sample_data();
        let scorer = SimilarityScorer::new(&RobustEuclidean, 3);
        let scored = scorer.score(&data, 42).unwrap();
        assert_eq!(scored.nrows(), 12);
        assert!(scored.ncols() <= 4);
        assert!(scored.ncols() >= 1);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = sample_data();
        let scorer = SimilarityScorer::new(&RobustEuclidean, 3);
        let a = scorer.score(&data, 7).unwrap();
        let b = scorer.score(&data, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_input_rejected() {
        let data = Array2::<f32>::zeros((0, 4));
        let scorer = SimilarityScorer::new(&RobustEuclidean, 1);
        assert!(scorer.score(&data, 0).is_err());
    }
}
