//! Fast representative-centroid generation.
//!
//! A lightweight, seeded Lloyd loop used wherever the pipeline needs a small
//! set of representative profiles quickly: seeding the index orderer's
//! correlation passes and compressing the similarity scorer's column basis.
//! Unlike the main clustering engine it never retries, never checks cluster
//! counts, and simply drops empty clusters; callers only need "some decent
//! centroids plus how many rows each one absorbed".

use ndarray::{Array2, ArrayView2};
use rand::prelude::*;

use crate::similarity::RobustEuclidean;

const MAX_ITERS: usize = 20;

/// Seeded mini k-means producing centroids and their member counts.
#[derive(Debug)]
pub struct QuickCentroids<'a> {
    data: ArrayView2<'a, f32>,
    num_centroids: usize,
    seed: u64,
}

impl<'a> QuickCentroids<'a> {
    /// Plan `num_centroids` centroids over the rows of `data`.
    pub fn new(data: ArrayView2<'a, f32>, num_centroids: usize, seed: u64) -> Self {
        Self {
            data,
            num_centroids,
            seed,
        }
    }

    /// Run the loop; returns non-empty centroids and per-centroid member
    /// counts. Fewer centroids than planned may come back when clusters
    /// empty out or the input is small.
    pub fn generate(&self) -> (Array2<f32>, Vec<usize>) {
        let n = self.data.nrows();
        let d = self.data.ncols();
        let k = self.num_centroids.min(n).max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);

        if n == 0 || d == 0 {
            return (Array2::zeros((0, d)), Vec::new());
        }

        let mut picks: Vec<usize> = (0..n).collect();
        picks.shuffle(&mut rng);
        picks.truncate(k);

        let mut centroids = Array2::<f32>::zeros((k, d));
        for (c, &row) in picks.iter().enumerate() {
            centroids.row_mut(c).assign(&self.data.row(row));
        }

        let mut assignments = vec![0usize; n];
        for _ in 0..MAX_ITERS {
            let mut changed = 0usize;
            for (i, slot) in assignments.iter_mut().enumerate() {
                let row = self.data.row(i);
                let mut best = *slot;
                let mut best_dist = f32::MAX;
                for c in 0..k {
                    let dist = RobustEuclidean::non_nan_mse(row, centroids.row(c));
                    if !dist.is_nan() && dist < best_dist {
                        best_dist = dist;
                        best = c;
                    }
                }
                if best != *slot {
                    *slot = best;
                    changed += 1;
                }
            }

            let (next, _) = Self::mean_centroids(self.data, &assignments, k);
            centroids = next;
            if changed == 0 {
                break;
            }
        }

        let (centroids, counts) = Self::mean_centroids(self.data, &assignments, k);
        let keep: Vec<usize> = (0..k).filter(|&c| counts[c] > 0).collect();
        let mut compact = Array2::<f32>::zeros((keep.len(), d));
        let mut weights = Vec::with_capacity(keep.len());
        for (out, &c) in keep.iter().enumerate() {
            compact.row_mut(out).assign(&centroids.row(c));
            weights.push(counts[c]);
        }
        (compact, weights)
    }

    /// Per-cluster means over non-NaN entries; dimensions with no valid
    /// member entry become NaN.
    fn mean_centroids(
        data: ArrayView2<'_, f32>,
        assignments: &[usize],
        k: usize,
    ) -> (Array2<f32>, Vec<usize>) {
        let d = data.ncols();
        let mut sums = Array2::<f64>::zeros((k, d));
        let mut dim_counts = Array2::<usize>::zeros((k, d));
        let mut member_counts = vec![0usize; k];
        for (i, &c) in assignments.iter().enumerate() {
            member_counts[c] += 1;
            for (j, &val) in data.row(i).iter().enumerate() {
                if !val.is_nan() {
                    sums[[c, j]] += f64::from(val);
                    dim_counts[[c, j]] += 1;
                }
            }
        }
        let mut centroids = Array2::<f32>::from_elem((k, d), f32::NAN);
        for c in 0..k {
            for j in 0..d {
                if dim_counts[[c, j]] > 0 {
                    centroids[[c, j]] = (sums[[c, j]] / dim_counts[[c, j]] as f64) as f32;
                }
            }
        }
        (centroids, member_counts)
    }
}
