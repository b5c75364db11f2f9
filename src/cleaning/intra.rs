//! Intra-chromosomal O/E matrix preparation for the index orderer.
//!
//! Short-range contacts dominate every Hi-C map regardless of compartment, so
//! entries within 5 Mb of the diagonal are masked before correlating bins.
//! Bad-bin rows and columns are masked as well.

use std::collections::BTreeSet;

use ndarray::Array2;

/// Genomic distance (bp) below which contacts carry no compartment signal.
const DISTANCE: u64 = 5_000_000;

/// Mask bad bins and the near-diagonal band of an intra-chromosomal matrix.
pub fn clean_intra(matrix: &mut Array2<f32>, resolution: u32, bad: &BTreeSet<usize>) {
    let n = matrix.nrows();
    let min_dist = (DISTANCE / u64::from(resolution)) as usize;

    for &bin in bad {
        if bin < n {
            matrix.row_mut(bin).fill(f32::NAN);
            matrix.column_mut(bin).fill(f32::NAN);
        }
    }

    for i in 0..n {
        let lo = i.saturating_sub(min_dist);
        let hi = (i + min_dist + 1).min(n);
        for j in lo..hi {
            matrix[[i, j]] = f32::NAN;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_band_and_bad_bins() {
        let mut matrix = Array2::<f32>::ones((100, 100));
        let bad: BTreeSet<usize> = [7].into_iter().collect();
        // 5 Mb at 1 Mb resolution masks |i - j| <= 5.
        clean_intra(&mut matrix, 1_000_000, &bad);
        assert!(matrix[[0, 3]].is_nan());
        assert!(matrix[[10, 15]].is_nan());
        assert!(!matrix[[10, 16]].is_nan());
        assert!(matrix[[7, 50]].is_nan());
        assert!(matrix[[50, 7]].is_nan());
        assert!(!matrix[[50, 90]].is_nan());
    }
}
