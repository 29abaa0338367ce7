#![deny(missing_docs)]
#![doc = "Dense multi-universe histograms, covariance matrix containers and the named artifact store."]

/// Axis lookup and out-of-range flow handling.
pub mod axis;
/// One- and two-dimensional accumulators.
pub mod hist;
/// Covariance and Cholesky factor containers.
pub mod matrix;
pub mod store;

pub use axis::{locate, FlowPolicy, FlowTally, Location};
pub use hist::{Histogram1D, Histogram2D};
pub use matrix::{CovarianceMatrix, LowerTriangular};
pub use store::{
    artifact_name, canonical_json, content_hash, Artifact, HistogramStore, StoreFile, CHOL_SUFFIX,
    COV_SUFFIX, CV_SUFFIX, FRACTIONAL_SUFFIX,
};
