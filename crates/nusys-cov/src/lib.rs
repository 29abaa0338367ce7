#![deny(missing_docs)]
#![doc = "Covariance estimation over multi-universe histograms, Cholesky factors and derived covariance summaries."]

/// Cholesky decomposition over non-degenerate bins.
pub mod cholesky;
/// Universe covariance estimator.
pub mod covariance;
/// Fractional, statistical and summed covariances.
pub mod derived;
pub mod summary;

pub use cholesky::{decompose, DEFAULT_TOLERANCE};
pub use covariance::{covariance, Normalization};
pub use derived::{fractional, statistical, sum};
pub use summary::{CovOptions, Summarizer, SummaryUnit};
