//! Genome-wide sparse-bin detection.
//!
//! A bin participates in clustering only if enough of its genome-wide contact
//! row is observed. For every chromosome we count, across all chromosome
//! pairs involving it, the bins' valid entries (finite and above 1e-10); a
//! bin whose missing fraction exceeds the configured threshold is excluded
//! from every downstream matrix. Bins with a degenerate normalization-vector
//! entry are excluded outright. With several datasets the union of exclusions
//! applies, so one composite row basis serves them all.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::dataset::ContactSource;
use crate::error::{Error, Result};
use crate::genome::Chromosome;
use crate::matrix::ops::NEAR_ZERO;

/// Per-chromosome sets of excluded bin indices. Computed once per run and
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct BadIndexSet {
    per_chrom: HashMap<usize, BTreeSet<usize>>,
}

impl BadIndexSet {
    /// Excluded bins for one chromosome.
    pub fn bad_for(&self, chrom: &Chromosome) -> BTreeSet<usize> {
        self.per_chrom.get(&chrom.index).cloned().unwrap_or_default()
    }

    /// Whether a bin of a chromosome is excluded.
    pub fn is_bad(&self, chrom: &Chromosome, bin: usize) -> bool {
        self.per_chrom
            .get(&chrom.index)
            .is_some_and(|set| set.contains(&bin))
    }

    /// Number of excluded bins for one chromosome.
    pub fn num_bad(&self, chrom: &Chromosome) -> usize {
        self.per_chrom.get(&chrom.index).map_or(0, BTreeSet::len)
    }

    fn extend(&mut self, chrom_index: usize, bins: impl IntoIterator<Item = usize>) {
        self.per_chrom.entry(chrom_index).or_default().extend(bins);
    }
}

/// Flags bins too sparse to cluster reliably.
#[derive(Debug, Clone)]
pub struct BadIndexFinder {
    sparsity_threshold: f32,
}

impl BadIndexFinder {
    /// A bin is bad when more than `sparsity_threshold` of its genome-wide
    /// row is missing or near zero.
    pub fn new(sparsity_threshold: f32) -> Self {
        Self { sparsity_threshold }
    }

    /// Compute the union of bad indices across all datasets.
    ///
    /// Fails with [`Error::SparseChromosome`] when a chromosome retains no
    /// good bin, which signals a resolution mismatch rather than bad data.
    pub fn find<S: ContactSource>(
        &self,
        sources: &[&S],
        chromosomes: &[Chromosome],
        resolution: u32,
        norm: &str,
    ) -> Result<BadIndexSet> {
        if sources.is_empty() || chromosomes.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut set = BadIndexSet::default();
        for source in sources {
            self.scan_dataset(*source, chromosomes, resolution, norm, &mut set)?;
        }

        for chrom in chromosomes {
            let bins = chrom.num_bins(resolution);
            if set.num_bad(chrom) >= bins {
                return Err(Error::SparseChromosome {
                    name: chrom.name.clone(),
                });
            }
            debug!(
                chrom = %chrom.name,
                bad = set.num_bad(chrom),
                total = bins,
                "sparsity filter"
            );
        }
        Ok(set)
    }

    fn scan_dataset<S: ContactSource>(
        &self,
        source: &S,
        chromosomes: &[Chromosome],
        resolution: u32,
        norm: &str,
        set: &mut BadIndexSet,
    ) -> Result<()> {
        let total_bins: usize = chromosomes.iter().map(|c| c.num_bins(resolution)).sum();
        let mut valid: HashMap<usize, Vec<usize>> = chromosomes
            .iter()
            .map(|c| (c.index, vec![0usize; c.num_bins(resolution)]))
            .collect();

        for (i, chr1) in chromosomes.iter().enumerate() {
            for chr2 in &chromosomes[i..] {
                let records = source.contact_records(chr1, chr2, resolution, norm)?;
                for record in records {
                    if record.counts.is_nan() || record.counts < NEAR_ZERO {
                        continue;
                    }
                    if let Some(counts) = valid.get_mut(&chr1.index) {
                        if record.bin_x < counts.len() {
                            counts[record.bin_x] += 1;
                        }
                    }
                    let same_bin = chr1.index == chr2.index && record.bin_x == record.bin_y;
                    if !same_bin {
                        if let Some(counts) = valid.get_mut(&chr2.index) {
                            if record.bin_y < counts.len() {
                                counts[record.bin_y] += 1;
                            }
                        }
                    }
                }
            }
        }

        for chrom in chromosomes {
            let counts = &valid[&chrom.index];
            let norm_vector = source.norm_vector(chrom, resolution, norm)?;
            let mut bad = Vec::new();
            for (bin, &observed) in counts.iter().enumerate() {
                let missing = total_bins.saturating_sub(observed) as f32 / total_bins as f32;
                let norm_ok = norm_vector
                    .get(bin)
                    .is_some_and(|&v| !v.is_nan() && v >= NEAR_ZERO);
                if missing > self.sparsity_threshold || !norm_ok {
                    bad.push(bin);
                }
            }
            set.extend(chrom.index, bad);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ContactRecord, DenseSource};

    fn dense_intra(n: usize, skip_bin: Option<usize>) -> Vec<ContactRecord> {
        let mut records = Vec::new();
        for x in 0..n {
            for y in x..n {
                if skip_bin == Some(x) || skip_bin == Some(y) {
                    continue;
                }
                records.push(ContactRecord::new(x, y, 1.0));
            }
        }
        records
    }

    fn dense_inter(n1: usize, n2: usize, skip_bin: Option<usize>) -> Vec<ContactRecord> {
        let mut records = Vec::new();
        for x in 0..n1 {
            if skip_bin == Some(x) {
                continue;
            }
            for y in 0..n2 {
                records.push(ContactRecord::new(x, y, 1.0));
            }
        }
        records
    }

    fn two_chrom_setup(skip_bin: Option<usize>) -> (Vec<Chromosome>, DenseSource) {
        let chroms = vec![
            Chromosome::new(0, "chr1", 500),
            Chromosome::new(1, "chr2", 300),
        ];
        let mut source = DenseSource::new(chroms.clone());
        // Fully dense intra and inter blocks, except optionally one chr1 bin.
        source.add_contacts(0, 0, dense_intra(5, skip_bin));
        source.add_contacts(1, 1, dense_intra(3, None));
        source.add_contacts(0, 1, dense_inter(5, 3, skip_bin));
        (chroms, source)
    }

    #[test]
    fn test_dense_map_has_no_bad_bins() {
        let (chroms, source) = two_chrom_setup(None);
        let finder = BadIndexFinder::new(0.5);
        let set = finder.find(&[&source], &chroms, 100, "NONE").unwrap();
        assert_eq!(set.num_bad(&chroms[0]), 0);
        assert_eq!(set.num_bad(&chroms[1]), 0);
    }

    #[test]
    fn test_unobserved_bin_is_bad() {
        let (chroms, source) = two_chrom_setup(Some(2));
        let finder = BadIndexFinder::new(0.5);
        let set = finder.find(&[&source], &chroms, 100, "NONE").unwrap();
        assert!(set.is_bad(&chroms[0], 2));
        assert!(!set.is_bad(&chroms[0], 0));
    }

    #[test]
    fn test_degenerate_norm_entry_is_bad() {
        let (chroms, mut source) = two_chrom_setup(None);
        source.set_norm_vector(0, vec![1.0, f32::NAN, 1.0, 1.0, 0.0]);
        let finder = BadIndexFinder::new(0.5);
        let set = finder.find(&[&source], &chroms, 100, "NONE").unwrap();
        assert!(set.is_bad(&chroms[0], 1));
        assert!(set.is_bad(&chroms[0], 4));
        assert!(!set.is_bad(&chroms[0], 0));
    }

    #[test]
    fn test_empty_chromosome_is_fatal() {
        let chroms = vec![
            Chromosome::new(0, "chr1", 500),
            Chromosome::new(1, "chr2", 300),
        ];
        let mut source = DenseSource::new(chroms.clone());
        // chr2 never appears in any record.
        source.add_contacts(0, 0, dense_inter(5, 5, None));
        let finder = BadIndexFinder::new(0.5);
        let err = finder.find(&[&source], &chroms, 100, "NONE").unwrap_err();
        assert!(matches!(err, Error::SparseChromosome { .. }));
    }

    #[test]
    fn test_union_across_datasets() {
        let (chroms, good) = two_chrom_setup(None);
        let (_, sparse) = two_chrom_setup(Some(1));
        let finder = BadIndexFinder::new(0.5);
        let set = finder
            .find(&[&good, &sparse], &chroms, 100, "NONE")
            .unwrap();
        assert!(set.is_bad(&chroms[0], 1));
    }
}
