use std::fmt;

/// Result alias for `hiclust`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the subcompartment pipeline.
#[derive(Debug)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Matrix dimension mismatch (usize).
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Row counts differ when appending datasets column-wise.
    RowCountMismatch {
        /// Rows in the existing composite matrix.
        expected: usize,
        /// Rows in the dataset being appended.
        found: usize,
    },

    /// Every bin of a chromosome was flagged bad; the resolution is likely
    /// too coarse or too fine for this map.
    SparseChromosome {
        /// Chromosome name.
        name: String,
    },

    /// The composite matrix came out with zero rows or columns.
    SparseGenome,

    /// A chromosome pair had no inter-chromosomal contact records.
    MissingInterData {
        /// First chromosome name.
        chr1: String,
        /// Second chromosome name.
        chr2: String,
    },

    /// Matrix inversion failure (singular covariance subset).
    InversionFailed,

    /// A Gaussian evaluation produced a non-finite or degenerate value.
    DegenerateGaussian {
        /// Row index that triggered the failure.
        row: usize,
    },

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// I/O failure while exporting results.
    Io(std::io::Error),

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::RowCountMismatch { expected, found } => {
                write!(
                    f,
                    "cannot append dataset: {found} rows does not match {expected}"
                )
            }
            Error::SparseChromosome { name } => {
                write!(
                    f,
                    "all bins of chromosome {name} are too sparse; try another resolution"
                )
            }
            Error::SparseGenome => {
                write!(
                    f,
                    "no usable matrix; the map is likely too sparse for this resolution or compression"
                )
            }
            Error::MissingInterData { chr1, chr2 } => {
                write!(f, "missing interchromosomal data for {chr1} vs {chr2}")
            }
            Error::InversionFailed => write!(f, "matrix inversion failed"),
            Error::DegenerateGaussian { row } => {
                write!(f, "degenerate gaussian evaluation at row {row}")
            }
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
