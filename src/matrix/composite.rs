//! Composite genome-wide interaction matrix.
//!
//! Rows are every good (non-excluded) bin of the genome in chromosome order;
//! columns are the compressed genome-wide basis. Each chromosome pair
//! contributes one block: intra-chromosomal blocks are NaN (self-interaction
//! is not usable clustering signal), inter-chromosomal records accumulate
//! symmetrically into the blocks of both orientations. The matrix is built
//! once per dataset and treated as read-only afterwards; combining datasets
//! appends columns and demands identical row bases.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use tracing::{debug, info};

use crate::cleaning::{BadIndexSet, IndexOrderer};
use crate::dataset::ContactSource;
use crate::error::{Error, Result};
use crate::genome::{Chromosome, Dimension};
use crate::export::SubcompartmentInterval;
use crate::matrix::ops;

/// The assembled genome × compressed-genome matrix plus its row interval map
/// and per-column bin weights.
#[derive(Debug)]
pub struct CompositeMatrix {
    data: Array2<f32>,
    row_map: BTreeMap<usize, SubcompartmentInterval>,
    weights: Vec<usize>,
}

impl CompositeMatrix {
    /// Number of genome-wide rows.
    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of compressed columns.
    pub fn num_columns(&self) -> usize {
        self.data.ncols()
    }

    /// The matrix itself.
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Map from row index to the genomic interval it represents.
    pub fn row_map(&self) -> &BTreeMap<usize, SubcompartmentInterval> {
        &self.row_map
    }

    /// Mutable access for the cleaning stage, which prunes rows and must
    /// keep the map consistent.
    pub fn parts_mut(
        &mut self,
    ) -> (
        &mut Array2<f32>,
        &mut BTreeMap<usize, SubcompartmentInterval>,
    ) {
        (&mut self.data, &mut self.row_map)
    }

    /// Replace the matrix after cleaning.
    pub fn replace_data(&mut self, data: Array2<f32>) {
        self.data = data;
    }

    /// Per-column bin counts.
    pub fn weights(&self) -> &[usize] {
        &self.weights
    }

    /// Z-score this dataset's columns in place, so differently scaled
    /// datasets can be appended on equal footing.
    pub fn zscore_columns(&mut self) {
        ops::zscore_columns(&mut self.data, 1);
    }

    /// Append another dataset's columns. Row counts must match exactly.
    pub fn append_columns(&mut self, other: CompositeMatrix) -> Result<()> {
        if self.num_rows() != other.num_rows() {
            return Err(Error::RowCountMismatch {
                expected: self.num_rows(),
                found: other.num_rows(),
            });
        }
        self.data = ops::concatenate_columns(&self.data, &other.data)?;
        self.weights.extend(other.weights);
        Ok(())
    }
}

/// Builds [`CompositeMatrix`] values from a contact source.
#[derive(Debug)]
pub struct MatrixAssembler<'a> {
    chromosomes: &'a [Chromosome],
    resolution: u32,
    norm: String,
    num_columns_to_join: usize,
    bad: &'a BadIndexSet,
}

impl<'a> MatrixAssembler<'a> {
    /// Configure an assembler over one genome and exclusion set.
    pub fn new(
        chromosomes: &'a [Chromosome],
        resolution: u32,
        norm: impl Into<String>,
        num_columns_to_join: usize,
        bad: &'a BadIndexSet,
    ) -> Self {
        Self {
            chromosomes,
            resolution,
            norm: norm.into(),
            num_columns_to_join,
            bad,
        }
    }

    fn good_length(&self, chrom: &Chromosome) -> usize {
        chrom.num_bins(self.resolution) - self.bad.num_bad(chrom)
    }

    /// Assemble the composite matrix for one dataset, optionally using a
    /// reordering to define the compressed columns.
    pub fn assemble<S: ContactSource>(
        &self,
        source: &S,
        orderer: Option<&IndexOrderer>,
    ) -> Result<CompositeMatrix> {
        let raw_lengths: Vec<usize> = self
            .chromosomes
            .iter()
            .map(|c| self.good_length(c))
            .collect();
        let compressed_lengths: Vec<usize> = match orderer {
            Some(orderer) => self
                .chromosomes
                .iter()
                .map(|c| orderer.compressed_length(c))
                .collect(),
            None => raw_lengths
                .iter()
                .map(|&len| len.div_ceil(self.num_columns_to_join))
                .collect(),
        };

        let dimensions = Dimension::from_lengths(&raw_lengths)?;
        let compressed = Dimension::from_lengths(&compressed_lengths)?;
        if dimensions.length == 0 || compressed.length == 0 {
            return Err(Error::SparseGenome);
        }

        let weights = match orderer {
            Some(orderer) => orderer.weights().to_vec(),
            None => {
                // Without reordering every compressed column absorbs up to
                // `num_columns_to_join` consecutive good bins.
                let mut weights = Vec::with_capacity(compressed.length);
                for (&len, &clen) in raw_lengths.iter().zip(&compressed_lengths) {
                    for col in 0..clen {
                        let absorbed = len - col * self.num_columns_to_join;
                        weights.push(absorbed.min(self.num_columns_to_join));
                    }
                }
                weights
            }
        };
        if weights.len() != compressed.length {
            return Err(Error::DimensionMismatch {
                expected: compressed.length,
                found: weights.len(),
            });
        }

        info!(
            rows = dimensions.length,
            cols = compressed.length,
            "assembling composite matrix"
        );

        let mut matrix = Array2::<f32>::zeros((dimensions.length, compressed.length));
        let mut row_map = BTreeMap::new();

        for (i, chr1) in self.chromosomes.iter().enumerate() {
            for (j, chr2) in self.chromosomes.iter().enumerate().skip(i) {
                self.fill_region(
                    source,
                    &mut matrix,
                    &mut row_map,
                    orderer,
                    chr1,
                    dimensions.offset(i),
                    compressed.offset(i),
                    chr2,
                    dimensions.offset(j),
                    compressed.offset(j),
                )?;
                debug!(chr1 = %chr1.name, chr2 = %chr2.name, "filled block");
            }
        }

        Ok(CompositeMatrix {
            data: matrix,
            row_map,
            weights,
        })
    }

    /// Row map for one chromosome: good bin index → genome-wide row.
    fn local_row_map(&self, chrom: &Chromosome, offset: usize) -> HashMap<usize, usize> {
        let mut map = HashMap::new();
        let bad = self.bad.bad_for(chrom);
        let mut counter = 0usize;
        for bin in 0..chrom.num_bins(self.resolution) {
            if bad.contains(&bin) {
                continue;
            }
            map.insert(bin, offset + counter);
            counter += 1;
        }
        map
    }

    /// Column map for one chromosome: good bin index → genome-wide
    /// compressed column.
    fn local_col_map(
        &self,
        chrom: &Chromosome,
        offset: usize,
        orderer: Option<&IndexOrderer>,
    ) -> HashMap<usize, usize> {
        match orderer {
            Some(orderer) => {
                let mut map = HashMap::new();
                for bin in 0..chrom.num_bins(self.resolution) {
                    if let Some(col) = orderer.compressed_column(chrom, bin) {
                        map.insert(bin, offset + col);
                    }
                }
                map
            }
            None => {
                let bad = self.bad.bad_for(chrom);
                let mut map = HashMap::new();
                let mut counter = 0usize;
                for bin in 0..chrom.num_bins(self.resolution) {
                    if bad.contains(&bin) {
                        continue;
                    }
                    map.insert(bin, offset + counter / self.num_columns_to_join);
                    counter += 1;
                }
                map
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_region<S: ContactSource>(
        &self,
        source: &S,
        matrix: &mut Array2<f32>,
        row_map: &mut BTreeMap<usize, SubcompartmentInterval>,
        orderer: Option<&IndexOrderer>,
        chr1: &Chromosome,
        row_offset1: usize,
        col_offset1: usize,
        chr2: &Chromosome,
        row_offset2: usize,
        col_offset2: usize,
    ) -> Result<()> {
        let is_intra = chr1.index == chr2.index;
        let records = source.contact_records(chr1, chr2, self.resolution, &self.norm)?;
        if !is_intra && records.is_empty() {
            return Err(Error::MissingInterData {
                chr1: chr1.name.clone(),
                chr2: chr2.name.clone(),
            });
        }

        let rows1 = self.local_row_map(chr1, row_offset1);
        let cols1 = self.local_col_map(chr1, col_offset1, orderer);
        let rows2 = self.local_row_map(chr2, row_offset2);
        let cols2 = self.local_col_map(chr2, col_offset2, orderer);

        if is_intra {
            self.fill_interval_map(chr1, row_offset1, row_map);
            for &row in rows1.values() {
                for &col in cols2.values() {
                    matrix[[row, col]] = f32::NAN;
                }
            }
            return Ok(());
        }

        for record in records {
            if !record.counts.is_finite() {
                continue;
            }
            if let (Some(&row1), Some(&col2)) = (rows1.get(&record.bin_x), cols2.get(&record.bin_y))
            {
                matrix[[row1, col2]] += record.counts;
                // The mirrored block accumulates the same contact.
                if let (Some(&row2), Some(&col1)) =
                    (rows2.get(&record.bin_y), cols1.get(&record.bin_x))
                {
                    matrix[[row2, col1]] += record.counts;
                }
            }
        }
        Ok(())
    }

    fn fill_interval_map(
        &self,
        chrom: &Chromosome,
        offset: usize,
        row_map: &mut BTreeMap<usize, SubcompartmentInterval>,
    ) {
        let bad = self.bad.bad_for(chrom);
        let res = u64::from(self.resolution);
        let mut counter = 0usize;
        for bin in 0..chrom.num_bins(self.resolution) {
            if bad.contains(&bin) {
                continue;
            }
            let start = bin as u64 * res;
            row_map.insert(
                offset + counter,
                SubcompartmentInterval::new(chrom.index, chrom.name.clone(), start, start + res, 0),
            );
            counter += 1;
        }
    }
}
