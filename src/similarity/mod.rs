//! Similarity metrics and row scoring.

mod metrics;
mod scorer;

pub use metrics::{
    MetricKind, RobustCorrelation, RobustCosine, RobustEuclidean, SimilarityMetric,
};
pub use scorer::SimilarityScorer;
