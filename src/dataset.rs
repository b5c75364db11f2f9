//! Contact data interface.
//!
//! The pipeline never reads Hi-C container files itself. A caller supplies a
//! [`ContactSource`] (typically an adapter over the file-format layer) that
//! yields raw contact records per chromosome pair plus normalization vectors
//! by name. [`DenseSource`] is an in-memory implementation used by the test
//! suite and by callers that already hold the data.

use std::collections::HashMap;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::genome::Chromosome;

/// Cap applied to observed/expected ratios before correlation ordering.
const OE_CAP: f32 = 3.0;

/// A single normalized contact count between two bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRecord {
    /// Bin index on the first chromosome.
    pub bin_x: usize,
    /// Bin index on the second chromosome.
    pub bin_y: usize,
    /// Normalized contact count.
    pub counts: f32,
}

impl ContactRecord {
    /// Create a new contact record.
    pub fn new(bin_x: usize, bin_y: usize, counts: f32) -> Self {
        Self {
            bin_x,
            bin_y,
            counts,
        }
    }
}

/// Read access to one Hi-C dataset at a fixed set of resolutions.
pub trait ContactSource {
    /// Chromosomes of this dataset, in processing order.
    fn chromosomes(&self) -> &[Chromosome];

    /// Contact records for a chromosome pair at `resolution`, normalized by
    /// the vector named `norm`. Pairs are requested with
    /// `chr1.index <= chr2.index`.
    fn contact_records(
        &self,
        chr1: &Chromosome,
        chr2: &Chromosome,
        resolution: u32,
        norm: &str,
    ) -> Result<Vec<ContactRecord>>;

    /// Per-bin normalization vector for one chromosome.
    fn norm_vector(&self, chrom: &Chromosome, resolution: u32, norm: &str) -> Result<Vec<f32>>;
}

/// In-memory contact source backed by explicit record lists.
#[derive(Debug, Clone, Default)]
pub struct DenseSource {
    chromosomes: Vec<Chromosome>,
    records: HashMap<(usize, usize), Vec<ContactRecord>>,
    norm_vectors: HashMap<usize, Vec<f32>>,
}

impl DenseSource {
    /// Create an empty source over the given chromosomes.
    pub fn new(chromosomes: Vec<Chromosome>) -> Self {
        Self {
            chromosomes,
            records: HashMap::new(),
            norm_vectors: HashMap::new(),
        }
    }

    /// Register contact records for a chromosome pair (indices in processing
    /// order, `i <= j`).
    pub fn add_contacts(&mut self, i: usize, j: usize, records: Vec<ContactRecord>) {
        self.records.entry((i, j)).or_default().extend(records);
    }

    /// Register a normalization vector for one chromosome.
    pub fn set_norm_vector(&mut self, chrom_index: usize, vector: Vec<f32>) {
        self.norm_vectors.insert(chrom_index, vector);
    }
}

impl ContactSource for DenseSource {
    fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    fn contact_records(
        &self,
        chr1: &Chromosome,
        chr2: &Chromosome,
        _resolution: u32,
        _norm: &str,
    ) -> Result<Vec<ContactRecord>> {
        Ok(self
            .records
            .get(&(chr1.index, chr2.index))
            .cloned()
            .unwrap_or_default())
    }

    fn norm_vector(&self, chrom: &Chromosome, resolution: u32, _norm: &str) -> Result<Vec<f32>> {
        match self.norm_vectors.get(&chrom.index) {
            Some(v) => Ok(v.clone()),
            // No vector registered means unnormalized data; every bin passes.
            None => Ok(vec![1.0; chrom.num_bins(resolution)]),
        }
    }
}

/// Dense symmetric intra-chromosomal matrix from raw records.
pub fn intra_matrix<S: ContactSource + ?Sized>(
    source: &S,
    chrom: &Chromosome,
    resolution: u32,
    norm: &str,
) -> Result<Array2<f32>> {
    let n = chrom.num_bins(resolution);
    if n == 0 {
        return Err(Error::EmptyInput);
    }
    let mut matrix = Array2::<f32>::zeros((n, n));
    for record in source.contact_records(chrom, chrom, resolution, norm)? {
        if !record.counts.is_finite() {
            continue;
        }
        if record.bin_x < n && record.bin_y < n {
            matrix[[record.bin_x, record.bin_y]] += record.counts;
            if record.bin_x != record.bin_y {
                matrix[[record.bin_y, record.bin_x]] += record.counts;
            }
        }
    }
    Ok(matrix)
}

/// Observed/expected transform of an intra-chromosomal matrix.
///
/// Expected counts are the per-diagonal means; ratios are capped at 3.0 and
/// positions with zero expected signal become NaN.
pub fn oe_matrix<S: ContactSource + ?Sized>(
    source: &S,
    chrom: &Chromosome,
    resolution: u32,
    norm: &str,
) -> Result<Array2<f32>> {
    let observed = intra_matrix(source, chrom, resolution, norm)?;
    let n = observed.nrows();

    let mut expected = vec![0.0f64; n];
    for d in 0..n {
        let mut sum = 0.0f64;
        for i in 0..n - d {
            sum += f64::from(observed[[i, i + d]]);
        }
        expected[d] = sum / (n - d) as f64;
    }

    let mut oe = Array2::<f32>::from_elem((n, n), f32::NAN);
    for i in 0..n {
        for j in 0..n {
            let d = i.abs_diff(j);
            if expected[d] > 0.0 {
                let ratio = (f64::from(observed[[i, j]]) / expected[d]) as f32;
                oe[[i, j]] = ratio.min(OE_CAP);
            }
        }
    }
    Ok(oe)
}
