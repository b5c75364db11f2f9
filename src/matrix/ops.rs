//! Column-wise matrix transforms used by the cleaning and scoring stages.
//!
//! All statistics treat NaN as missing and entries at or below 1e-10 as
//! unobserved zeros; denominators are clamped to a minimum count of 1 so an
//! empty column never divides by zero. Columns can be batched so that
//! `batch` adjacent columns share one mean/stddev pair.

use ndarray::Array2;

use crate::error::{Error, Result};

/// Entries at or below this are treated as unobserved when accumulating
/// column statistics.
pub const NEAR_ZERO: f32 = 1e-10;

/// In-place `ln(1 + x)` with NaN passthrough. Infinite results are replaced
/// by `bad_val`; a NaN result stays NaN and keeps marking missing data.
pub fn log1p_with_cleanup(matrix: &mut Array2<f32>, bad_val: f32) {
    for v in matrix.iter_mut() {
        if v.is_nan() {
            continue;
        }
        let logged = (*v + 1.0).ln();
        *v = if logged.is_infinite() { bad_val } else { logged };
    }
}

fn num_batches(ncols: usize, batch: usize) -> usize {
    ncols / batch + 1
}

/// Per-batched-column means over non-NaN entries above [`NEAR_ZERO`].
pub fn column_nonzero_means(matrix: &Array2<f32>, batch: usize) -> Vec<f32> {
    let n = num_batches(matrix.ncols(), batch);
    let mut sums = vec![0.0f64; n];
    let mut counts = vec![0usize; n];
    for row in matrix.rows() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_nan() && val > NEAR_ZERO {
                sums[j / batch] += f64::from(val);
                counts[j / batch] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&s, &c)| (s / c.max(1) as f64) as f32)
        .collect()
}

/// Per-batched-column standard deviations over non-NaN entries above
/// [`NEAR_ZERO`], given matching means.
pub fn column_nonzero_stddevs(matrix: &Array2<f32>, means: &[f32], batch: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; means.len()];
    let mut counts = vec![0usize; means.len()];
    for row in matrix.rows() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_nan() && val > NEAR_ZERO {
                let diff = f64::from(val) - f64::from(means[j / batch]);
                sums[j / batch] += diff * diff;
                counts[j / batch] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&s, &c)| ((s / c.max(1) as f64) as f32).sqrt())
        .collect()
}

/// Convert entries whose column z-score exceeds `threshold` to NaN.
///
/// Only non-NaN entries above [`NEAR_ZERO`] are considered; the conversion is
/// one-sided, dropping unreliably large values rather than clipping them.
pub fn threshold_by_zscore_to_nan(matrix: &mut Array2<f32>, threshold: f32, batch: usize) {
    let means = column_nonzero_means(matrix, batch);
    let stddevs = column_nonzero_stddevs(matrix, &means, batch);
    for mut row in matrix.rows_mut() {
        for (j, val) in row.iter_mut().enumerate() {
            if !val.is_nan() && *val > NEAR_ZERO {
                let b = j / batch;
                if stddevs[b] > 0.0 && (*val - means[b]) / stddevs[b] > threshold {
                    *val = f32::NAN;
                }
            }
        }
    }
}

/// In-place column z-score applied to every non-NaN entry; statistics come
/// from the nonzero entries only.
pub fn zscore_columns(matrix: &mut Array2<f32>, batch: usize) {
    let means = column_nonzero_means(matrix, batch);
    let stddevs = column_nonzero_stddevs(matrix, &means, batch);
    for mut row in matrix.rows_mut() {
        for (j, val) in row.iter_mut().enumerate() {
            if !val.is_nan() {
                let b = j / batch;
                if stddevs[b] > 0.0 {
                    *val = (*val - means[b]) / stddevs[b];
                }
            }
        }
    }
}

/// Column z-score scaled by the square root of each column's bin weight, so
/// compressed columns representing more bins carry proportional influence in
/// Euclidean distances.
pub fn zscore_columns_weighted(matrix: &mut Array2<f32>, weights: &[usize]) -> Result<()> {
    if weights.len() != matrix.ncols() {
        return Err(Error::DimensionMismatch {
            expected: matrix.ncols(),
            found: weights.len(),
        });
    }
    let means = column_nonzero_means(matrix, 1);
    let stddevs = column_nonzero_stddevs(matrix, &means, 1);
    for mut row in matrix.rows_mut() {
        for (j, val) in row.iter_mut().enumerate() {
            if !val.is_nan() && stddevs[j] > 0.0 {
                *val = (*val - means[j]) / stddevs[j] * (weights[j] as f32).sqrt();
            }
        }
    }
    Ok(())
}

/// Concatenate two matrices column-wise; row counts must match exactly.
pub fn concatenate_columns(a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>> {
    if a.nrows() != b.nrows() {
        return Err(Error::RowCountMismatch {
            expected: a.nrows(),
            found: b.nrows(),
        });
    }
    let mut combo = Array2::<f32>::zeros((a.nrows(), a.ncols() + b.ncols()));
    combo.slice_mut(ndarray::s![.., ..a.ncols()]).assign(a);
    combo.slice_mut(ndarray::s![.., a.ncols()..]).assign(b);
    Ok(combo)
}
