//! Subcompartment intervals and result export.
//!
//! Cluster assignments leave the pipeline as labeled genomic intervals.
//! Adjacent same-cluster intervals are collapsed before writing, and the
//! tab-delimited output parses back losslessly so downstream tools (and the
//! round-trip tests) can consume it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use tracing::info;

use crate::error::{Error, Result};

/// One labeled genomic interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubcompartmentInterval {
    /// Chromosome position in processing order.
    pub chr_index: usize,
    /// Chromosome display name.
    pub chr_name: String,
    /// Interval start (bp, inclusive).
    pub start: u64,
    /// Interval end (bp, exclusive).
    pub end: u64,
    /// Assigned cluster, 1-based in exported files.
    pub cluster_id: usize,
}

impl SubcompartmentInterval {
    /// Create a new interval.
    pub fn new(
        chr_index: usize,
        chr_name: impl Into<String>,
        start: u64,
        end: u64,
        cluster_id: usize,
    ) -> Self {
        Self {
            chr_index,
            chr_name: chr_name.into(),
            start,
            end,
            cluster_id,
        }
    }

    /// Copy of this interval carrying a different cluster id.
    pub fn with_cluster(&self, cluster_id: usize) -> Self {
        Self {
            cluster_id,
            ..self.clone()
        }
    }
}

/// Turn per-row labels into intervals via the composite matrix's row map.
/// Rows without a label (members of discarded tiny clusters) are skipped.
pub fn intervals_from_labels(
    row_map: &BTreeMap<usize, SubcompartmentInterval>,
    labels: &[Option<usize>],
) -> Vec<SubcompartmentInterval> {
    let mut intervals = Vec::new();
    for (row, label) in labels.iter().enumerate() {
        if let (Some(cluster), Some(interval)) = (label, row_map.get(&row)) {
            intervals.push(interval.with_cluster(cluster + 1));
        }
    }
    intervals
}

/// Sort intervals and merge abutting neighbours that share a chromosome and
/// cluster. Merging is idempotent: collapsing twice changes nothing.
pub fn collapse(intervals: &mut Vec<SubcompartmentInterval>) {
    intervals.sort_unstable_by(|a, b| {
        (a.chr_index, a.start, a.end).cmp(&(b.chr_index, b.start, b.end))
    });
    let mut merged: Vec<SubcompartmentInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals.drain(..) {
        match merged.last_mut() {
            Some(last)
                if last.chr_index == interval.chr_index
                    && last.cluster_id == interval.cluster_id
                    && last.end == interval.start =>
            {
                last.end = interval.end;
            }
            _ => merged.push(interval),
        }
    }
    *intervals = merged;
}

/// Write intervals as tab-delimited (chrom, start, end, clusterID) records.
pub fn write_intervals(path: &Path, intervals: &[SubcompartmentInterval]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for interval in intervals {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            interval.chr_name, interval.start, interval.end, interval.cluster_id
        )?;
    }
    writer.flush()?;
    info!(path = %path.display(), count = intervals.len(), "wrote intervals");
    Ok(())
}

/// Parse records written by [`write_intervals`], as (chrom, start, end,
/// clusterID) tuples.
pub fn read_intervals(path: &Path) -> Result<Vec<(String, u64, u64, usize)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(Error::Other(format!(
                "malformed interval record at line {}: {line}",
                idx + 1
            )));
        }
        let start = fields[1]
            .parse::<u64>()
            .map_err(|e| Error::Other(format!("bad start at line {}: {e}", idx + 1)))?;
        let end = fields[2]
            .parse::<u64>()
            .map_err(|e| Error::Other(format!("bad end at line {}: {e}", idx + 1)))?;
        let cluster = fields[3]
            .parse::<usize>()
            .map_err(|e| Error::Other(format!("bad cluster at line {}: {e}", idx + 1)))?;
        records.push((fields[0].to_string(), start, end, cluster));
    }
    Ok(records)
}

/// Per-k model-selection scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterScores {
    /// Candidate cluster count.
    pub num_clusters: usize,
    /// Best within-cluster sum of squares across restarts.
    pub wcss: f64,
    /// `wcss + 2 * dimensionality * k`.
    pub aic: f64,
    /// `wcss + 0.5 * dimensionality * k * ln(rows)`.
    pub bic: f64,
}

/// Write the per-k score table as tab-delimited rows.
pub fn write_score_table(path: &Path, table: &[ClusterScores]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "numClusters\twcss\taic\tbic")?;
    for row in table {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            row.num_clusters, row.wcss, row.aic, row.bic
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Dump a matrix as a flat numeric array with shape metadata on the first
/// line, for external inspection and plotting.
pub fn write_matrix(path: &Path, matrix: &Array2<f32>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "# shape {} {}", matrix.nrows(), matrix.ncols())?;
    for row in matrix.rows() {
        let fields: Vec<String> = row.iter().map(|v| format!("{v}")).collect();
        writeln!(writer, "{}", fields.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(chr: usize, start: u64, end: u64, cluster: usize) -> SubcompartmentInterval {
        SubcompartmentInterval::new(chr, format!("chr{}", chr + 1), start, end, cluster)
    }

    #[test]
    fn test_collapse_merges_abutting_same_cluster() {
        let mut intervals = vec![
            interval(0, 0, 100, 1),
            interval(0, 100, 200, 1),
            interval(0, 200, 300, 2),
            interval(1, 0, 100, 1),
        ];
        collapse(&mut intervals);
        assert_eq!(
            intervals,
            vec![
                interval(0, 0, 200, 1),
                interval(0, 200, 300, 2),
                interval(1, 0, 100, 1),
            ]
        );
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let mut intervals = vec![
            interval(0, 100, 200, 1),
            interval(0, 0, 100, 1),
            interval(0, 300, 400, 1),
        ];
        collapse(&mut intervals);
        let once = intervals.clone();
        collapse(&mut intervals);
        assert_eq!(intervals, once);
        // The gap between 200 and 300 must survive.
        assert_eq!(intervals.len(), 2);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.bed");
        let mut intervals = vec![
            interval(0, 0, 100, 1),
            interval(0, 100, 200, 1),
            interval(1, 0, 100, 3),
        ];
        collapse(&mut intervals);
        write_intervals(&path, &intervals).unwrap();
        let parsed = read_intervals(&path).unwrap();
        let expected: Vec<(String, u64, u64, usize)> = intervals
            .iter()
            .map(|i| (i.chr_name.clone(), i.start, i.end, i.cluster_id))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_intervals_skip_unlabeled_rows() {
        let mut row_map = BTreeMap::new();
        row_map.insert(0, interval(0, 0, 100, 0));
        row_map.insert(1, interval(0, 100, 200, 0));
        let labels = vec![Some(2), None];
        let intervals = intervals_from_labels(&row_map, &labels);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].cluster_id, 3);
    }

    #[test]
    fn test_matrix_dump_shape_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.tsv");
        let matrix = ndarray::array![[1.0f32, f32::NAN], [0.5, 2.0]];
        write_matrix(&path, &matrix).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# shape 2 2\n"));
        assert!(text.contains("NaN"));
    }
}
