//! Reference genome coordinates.
//!
//! A chromosome is reference data only: an index into the processing order, a
//! name, and a length in base pairs. Bins are never materialized; a bin is the
//! integer `position / resolution` and all per-bin state lives in arrays.

use crate::error::{Error, Result};

/// An immutable chromosome record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chromosome {
    /// Position in the genome-wide processing order.
    pub index: usize,
    /// Display name, e.g. `chr1`.
    pub name: String,
    /// Length in base pairs.
    pub length: u64,
}

impl Chromosome {
    /// Create a new chromosome record.
    pub fn new(index: usize, name: impl Into<String>, length: u64) -> Self {
        Self {
            index,
            name: name.into(),
            length,
        }
    }

    /// Number of bins covering this chromosome at `resolution`.
    pub fn num_bins(&self, resolution: u32) -> usize {
        let res = u64::from(resolution);
        ((self.length + res - 1) / res) as usize
    }
}

/// Offsets and lengths of each chromosome inside a concatenated genome-wide
/// coordinate space.
///
/// Two instances are kept per composite matrix build: one for the raw
/// (uncompressed) row space and one for the compressed column space. Both use
/// the same chromosome ordering, so `offsets[i] + lengths[i] == offsets[i+1]`
/// and `length` is the total size of the concatenated axis.
#[derive(Debug, Clone)]
pub struct Dimension {
    /// Total length of the concatenated axis.
    pub length: usize,
    /// Starting offset of each chromosome, in processing order.
    pub offsets: Vec<usize>,
    /// Span of each chromosome, in processing order.
    pub lengths: Vec<usize>,
}

impl Dimension {
    /// Build from per-chromosome span lengths in processing order.
    pub fn from_lengths(lengths: &[usize]) -> Result<Self> {
        if lengths.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut total = 0usize;
        for &len in lengths {
            offsets.push(total);
            total += len;
        }
        Ok(Self {
            length: total,
            offsets,
            lengths: lengths.to_vec(),
        })
    }

    /// Offset of the chromosome at position `i` in processing order.
    pub fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_bins_rounds_up() {
        let chrom = Chromosome::new(0, "chr1", 500);
        assert_eq!(chrom.num_bins(100), 5);
        let chrom = Chromosome::new(1, "chr2", 301);
        assert_eq!(chrom.num_bins(100), 4);
        let chrom = Chromosome::new(2, "chr3", 300);
        assert_eq!(chrom.num_bins(100), 3);
    }

    #[test]
    fn test_dimension_offsets_increasing() {
        let dim = Dimension::from_lengths(&[5, 3, 7]).unwrap();
        assert_eq!(dim.length, 15);
        assert_eq!(dim.offsets, vec![0, 5, 8]);
        for w in dim.offsets.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_dimension_empty_is_error() {
        assert!(Dimension::from_lengths(&[]).is_err());
    }
}
