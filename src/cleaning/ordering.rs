//! Correlation-based bin reordering and compression.
//!
//! Inter-chromosomal columns are expensive: a genome at 100 kb has tens of
//! thousands of bins, and most neighbouring bins carry nearly identical
//! long-range profiles. The orderer rewrites each chromosome's bin order so
//! that strongly correlated bins sit adjacently, then every
//! `num_columns_to_join` consecutive positions collapse into one compressed
//! column of the composite matrix.
//!
//! # Ordering passes
//!
//! 1. A handful of representative centroids come from a seeded
//!    [`QuickCentroids`] run over the chromosome's cleaned O/E rows.
//! 2. Every unassigned bin is correlated against each centroid. The centroid
//!    with the most "decent" relations (|r| > 0.2) orders its bins first.
//! 3. For one centroid, bins are claimed in descending correlation bands
//!    (cutoff 0.9 down to 0.2 in steps of 0.1), then in the mirrored
//!    negative bands. After each centroid the position counter rounds up to
//!    a multiple of the compression factor so groups never straddle a
//!    compressed column.
//! 4. A final pass lets each leftover bin claim a position and pull in every
//!    later leftover whose direct pairwise correlation reaches 0.2.
//!
//! The only stochastic input is the centroid generation; a fixed seed makes
//! the whole permutation reproducible.

use std::collections::{BTreeSet, HashMap};

use ndarray::{Array1, Array2};
use rand::prelude::*;
use tracing::debug;

use crate::cleaning::bad_indices::BadIndexSet;
use crate::cleaning::centroids::QuickCentroids;
use crate::cleaning::intra::clean_intra;
use crate::dataset::{oe_matrix, ContactSource};
use crate::error::Result;
use crate::genome::Chromosome;
use crate::similarity::{RobustCorrelation, SimilarityMetric};

const CORR_MIN: f32 = 0.2;
const INCREMENT: f32 = 0.1;
const NUM_INITIAL_CENTROIDS: usize = 10;

/// Assignment state of one bin during and after ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Not yet claimed by any ordering pass.
    Unassigned,
    /// Excluded bin; never receives a position.
    Ignored,
    /// Final position in the reordered chromosome.
    Assigned(usize),
}

/// Per-chromosome reordering produced once per dataset.
#[derive(Debug)]
pub struct IndexOrderer {
    assignments: HashMap<usize, Vec<Slot>>,
    rearranged_lengths: HashMap<usize, usize>,
    weights: Vec<usize>,
    num_columns_to_join: usize,
}

impl IndexOrderer {
    /// Reorder every chromosome of `source`.
    pub fn new<S: ContactSource>(
        source: &S,
        chromosomes: &[Chromosome],
        resolution: u32,
        norm: &str,
        num_columns_to_join: usize,
        bad: &BadIndexSet,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut assignments = HashMap::new();
        let mut rearranged_lengths = HashMap::new();
        let mut per_chrom_weights = Vec::new();

        for chrom in chromosomes {
            let mut matrix = oe_matrix(source, chrom, resolution, norm)?;
            let bad_bins = bad.bad_for(chrom);
            clean_intra(&mut matrix, resolution, &bad_bins);

            let (slots, counter) =
                order_chromosome(&matrix, &bad_bins, num_columns_to_join, &mut rng);
            debug!(
                chrom = %chrom.name,
                bins = slots.len(),
                rearranged = counter,
                "ordered"
            );
            per_chrom_weights.push(group_weights(&slots, counter, num_columns_to_join));
            assignments.insert(chrom.index, slots);
            rearranged_lengths.insert(chrom.index, counter);
        }

        let weights = per_chrom_weights.concat();
        Ok(Self {
            assignments,
            rearranged_lengths,
            weights,
            num_columns_to_join,
        })
    }

    /// Slot array for one chromosome, indexed by original bin.
    pub fn slots(&self, chrom: &Chromosome) -> &[Slot] {
        &self.assignments[&chrom.index]
    }

    /// Pre-compression length of a chromosome's reordered axis; always a
    /// multiple of the compression factor.
    pub fn rearranged_length(&self, chrom: &Chromosome) -> usize {
        self.rearranged_lengths[&chrom.index]
    }

    /// Compressed column count for one chromosome.
    pub fn compressed_length(&self, chrom: &Chromosome) -> usize {
        self.rearranged_length(chrom).div_ceil(self.num_columns_to_join)
    }

    /// Compressed column (before chromosome offsetting) for an original bin,
    /// or None for excluded bins.
    pub fn compressed_column(&self, chrom: &Chromosome, bin: usize) -> Option<usize> {
        match self.assignments[&chrom.index].get(bin)? {
            Slot::Assigned(pos) => Some(pos / self.num_columns_to_join),
            _ => None,
        }
    }

    /// Bins absorbed by each compressed column, concatenated genome-wide in
    /// chromosome processing order.
    pub fn weights(&self) -> &[usize] {
        &self.weights
    }
}

fn group_weights(slots: &[Slot], counter: usize, num_columns_to_join: usize) -> Vec<usize> {
    let length = counter.div_ceil(num_columns_to_join);
    let mut weights = vec![0usize; length];
    for slot in slots {
        if let Slot::Assigned(pos) = slot {
            weights[pos / num_columns_to_join] += 1;
        }
    }
    weights
}

/// Round the position counter up to a multiple of the compression factor so
/// the next group starts on a fresh compressed column.
fn next_group_boundary(counter: usize, num_columns_to_join: usize) -> usize {
    counter.div_ceil(num_columns_to_join) * num_columns_to_join
}

fn order_chromosome(
    matrix: &Array2<f32>,
    bad: &BTreeSet<usize>,
    num_columns_to_join: usize,
    rng: &mut StdRng,
) -> (Vec<Slot>, usize) {
    let n = matrix.nrows();
    let mut slots = vec![Slot::Unassigned; n];
    for &bin in bad {
        if bin < n {
            slots[bin] = Slot::Ignored;
        }
    }

    let counter = first_round_by_centroids(matrix, &mut slots, num_columns_to_join, rng);
    let counter = second_round_pairwise(matrix, &mut slots, counter, num_columns_to_join);
    (slots, counter)
}

/// Correlate every unassigned bin against generated centroids and order the
/// centroids' bins, strongest-supported centroid first.
fn first_round_by_centroids(
    matrix: &Array2<f32>,
    slots: &mut [Slot],
    num_columns_to_join: usize,
    rng: &mut StdRng,
) -> usize {
    let live_rows: Vec<usize> = (0..slots.len())
        .filter(|&i| slots[i] == Slot::Unassigned)
        .collect();
    let mut live = Array2::<f32>::zeros((live_rows.len(), matrix.ncols()));
    for (out, &i) in live_rows.iter().enumerate() {
        live.row_mut(out).assign(&matrix.row(i));
    }

    let (centroids, _) =
        QuickCentroids::new(live.view(), NUM_INITIAL_CENTROIDS, rng.random()).generate();
    if centroids.nrows() == 0 {
        return 0;
    }

    let n = slots.len();
    let mut decent_relations = vec![0usize; centroids.nrows()];
    let mut correlations = Array2::<f32>::from_elem((centroids.nrows(), n), f32::NAN);
    for c in 0..centroids.nrows() {
        for z in 0..n {
            if slots[z] == Slot::Unassigned {
                let corr = RobustCorrelation.distance(centroids.row(c), matrix.row(z));
                correlations[[c, z]] = corr;
                if corr > CORR_MIN || corr < -CORR_MIN {
                    decent_relations[c] += 1;
                }
            }
        }
    }

    let best = decent_relations
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)
        .map(|(c, _)| c)
        .unwrap_or(0);

    let mut counter = sequential_ordering(
        correlations.row(best),
        slots,
        0,
        num_columns_to_join,
    );
    for c in 0..centroids.nrows() {
        if c == best {
            continue;
        }
        counter = sequential_ordering(correlations.row(c), slots, counter, num_columns_to_join);
    }
    counter
}

/// Claim bins for one centroid in descending correlation bands, positive
/// side first, then the mirrored negative bands.
fn sequential_ordering(
    correlations: ndarray::ArrayView1<'_, f32>,
    slots: &mut [Slot],
    start_counter: usize,
    num_columns_to_join: usize,
) -> usize {
    let mut counter = start_counter;

    let mut cutoff = 1.0 - INCREMENT;
    while cutoff >= CORR_MIN - 1e-6 {
        for (z, slot) in slots.iter_mut().enumerate() {
            if *slot == Slot::Unassigned && correlations[z] > cutoff {
                *slot = Slot::Assigned(counter);
                counter += 1;
            }
        }
        cutoff -= INCREMENT;
    }

    counter = next_group_boundary(counter, num_columns_to_join);

    let mut cutoff = CORR_MIN;
    while cutoff < 1.0 - 1e-6 {
        let upper = -cutoff;
        let lower = upper - INCREMENT;
        for (z, slot) in slots.iter_mut().enumerate() {
            let corr = correlations[z];
            if *slot == Slot::Unassigned && corr < upper && corr >= lower {
                *slot = Slot::Assigned(counter);
                counter += 1;
            }
        }
        cutoff += INCREMENT;
    }

    next_group_boundary(counter, num_columns_to_join)
}

/// Pair leftover bins by direct correlation.
fn second_round_pairwise(
    matrix: &Array2<f32>,
    slots: &mut [Slot],
    start_counter: usize,
    num_columns_to_join: usize,
) -> usize {
    let n = slots.len();
    let mut counter = start_counter;
    for anchor in 0..n {
        if slots[anchor] != Slot::Unassigned {
            continue;
        }
        slots[anchor] = Slot::Assigned(counter);
        counter += 1;

        for z in anchor + 1..n {
            if slots[z] == Slot::Unassigned {
                let corr = RobustCorrelation.distance(matrix.row(anchor), matrix.row(z));
                if corr >= CORR_MIN {
                    slots[z] = Slot::Assigned(counter);
                    counter += 1;
                }
            }
        }
        counter = next_group_boundary(counter, num_columns_to_join);
    }
    counter
}

/// Positions of assigned slots as a plain array, for inspection and tests.
pub fn assigned_positions(slots: &[Slot]) -> Array1<i64> {
    Array1::from_iter(slots.iter().map(|slot| match slot {
        Slot::Assigned(pos) => *pos as i64,
        _ => -1,
    }))
}
