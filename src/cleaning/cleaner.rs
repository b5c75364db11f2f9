//! Composite-matrix cleanup and normalization.
//!
//! Raw inter-chromosomal counts are heavy-tailed, so the cleaner works in
//! log space, converts unreliable outliers to NaN rather than clipping them,
//! prunes rows that lost too much data, and finishes with a weighted column
//! z-score so every column enters clustering on a comparable scale.

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::info;

use crate::error::Result;
use crate::export::SubcompartmentInterval;
use crate::matrix::ops;

/// Fraction of a row that may be missing before the row is pruned.
const PERCENT_NAN_ALLOWED: f32 = 0.5;

/// Entries below this count as zeros during row pruning.
const ROW_PRUNE_ZERO: f32 = 1e-5;

/// Cleans and z-scores the composite matrix.
#[derive(Debug, Clone)]
pub struct MatrixCleaner {
    zscore_threshold: f32,
    batched_num_cols: usize,
}

impl MatrixCleaner {
    /// Column z-scores above `zscore_threshold` become NaN.
    pub fn new(zscore_threshold: f32) -> Self {
        Self {
            zscore_threshold,
            batched_num_cols: 1,
        }
    }

    /// Share statistics across batches of adjacent columns.
    pub fn with_batched_cols(mut self, batched_num_cols: usize) -> Self {
        self.batched_num_cols = batched_num_cols.max(1);
        self
    }

    /// Run the full cleanup. `row_map` is remapped in place to the surviving
    /// row indices; `weights` are the per-column bin counts used by the final
    /// z-score.
    pub fn clean(
        &self,
        mut matrix: Array2<f32>,
        row_map: &mut BTreeMap<usize, SubcompartmentInterval>,
        weights: &[usize],
    ) -> Result<Array2<f32>> {
        ops::log1p_with_cleanup(&mut matrix, 1.0);
        ops::threshold_by_zscore_to_nan(&mut matrix, self.zscore_threshold, self.batched_num_cols);

        let before = matrix.nrows();
        let matrix = prune_sparse_rows(matrix, row_map);
        info!(
            rows_before = before,
            rows_after = matrix.nrows(),
            cols = matrix.ncols(),
            "cleaned matrix"
        );

        let mut matrix = matrix;
        ops::zscore_columns_weighted(&mut matrix, weights)?;
        Ok(matrix)
    }
}

/// Indices of rows whose NaN-or-zero fraction exceeds the allowance.
fn sparse_rows(matrix: &Array2<f32>) -> Vec<usize> {
    let n = matrix.ncols() as f32;
    let mut bad = Vec::new();
    for (i, row) in matrix.rows().into_iter().enumerate() {
        let missing = row
            .iter()
            .filter(|v| v.is_nan() || v.abs() < ROW_PRUNE_ZERO)
            .count();
        if missing as f32 / n > PERCENT_NAN_ALLOWED {
            bad.push(i);
        }
    }
    bad
}

/// Drop sparse rows, rewriting the row-to-interval map to the new indices.
fn prune_sparse_rows(
    matrix: Array2<f32>,
    row_map: &mut BTreeMap<usize, SubcompartmentInterval>,
) -> Array2<f32> {
    let bad = sparse_rows(&matrix);
    if bad.is_empty() {
        return matrix;
    }
    let bad_set: std::collections::BTreeSet<usize> = bad.into_iter().collect();
    let keep: Vec<usize> = (0..matrix.nrows())
        .filter(|i| !bad_set.contains(i))
        .collect();

    let mut pruned = Array2::<f32>::zeros((keep.len(), matrix.ncols()));
    let mut remapped = BTreeMap::new();
    for (new_idx, &old_idx) in keep.iter().enumerate() {
        pruned.row_mut(new_idx).assign(&matrix.row(old_idx));
        if let Some(interval) = row_map.get(&old_idx) {
            remapped.insert(new_idx, interval.clone());
        }
    }
    *row_map = remapped;
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn simple_row_map(rows: usize) -> BTreeMap<usize, SubcompartmentInterval> {
        (0..rows)
            .map(|i| {
                (
                    i,
                    SubcompartmentInterval::new(0, "chr1", i as u64 * 100, (i as u64 + 1) * 100, 0),
                )
            })
            .collect()
    }

    #[test]
    fn test_sparse_row_pruned_and_map_remapped() {
        let matrix = array![
            [2.0f32, 3.0, 4.0],
            [f32::NAN, f32::NAN, 1.0],
            [3.0, 2.0, 5.0],
            [4.0, 6.0, 2.0],
        ];
        let mut row_map = simple_row_map(4);
        let cleaner = MatrixCleaner::new(3.0);
        let cleaned = cleaner.clean(matrix, &mut row_map, &[1, 1, 1]).unwrap();
        assert_eq!(cleaned.nrows(), 3);
        assert_eq!(row_map.len(), 3);
        // Row 1 was dropped; former row 2 is now row 1.
        assert_eq!(row_map[&1].start, 200);
    }

    #[test]
    fn test_cleaned_columns_are_zscored() {
        let mut matrix = Array2::<f32>::zeros((8, 2));
        for i in 0..8 {
            matrix[[i, 0]] = 1.0 + i as f32;
            matrix[[i, 1]] = 10.0 + (i % 3) as f32;
        }
        let mut row_map = simple_row_map(8);
        let cleaner = MatrixCleaner::new(10.0);
        let cleaned = cleaner.clean(matrix, &mut row_map, &[1, 1]).unwrap();
        for j in 0..2 {
            let col: Vec<f32> = (0..cleaned.nrows()).map(|i| cleaned[[i, j]]).collect();
            let valid: Vec<f32> = col.iter().copied().filter(|v| !v.is_nan()).collect();
            let mean: f32 = valid.iter().sum::<f32>() / valid.len() as f32;
            assert!(mean.abs() < 1e-5, "column {j} mean {mean}");
        }
    }

    #[test]
    fn test_outliers_become_nan_not_clipped() {
        let mut matrix = Array2::<f32>::ones((30, 1));
        matrix[[0, 0]] = 1.0e6;
        let mut row_map = simple_row_map(30);
        let cleaner = MatrixCleaner::new(3.0);
        let cleaned = cleaner.clean(matrix, &mut row_map, &[1]).unwrap();
        // The outlier row became NaN-only and was pruned entirely.
        assert_eq!(cleaned.nrows(), 29);
        assert!(cleaned.iter().all(|v| !v.is_nan()));
    }
}
