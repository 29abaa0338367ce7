#![deny(missing_docs)]
#![doc = "Bootstrap resampling over the shared readouts of a nominal and a varied sample."]

pub mod resample;
/// Draw universes.
pub mod universe;

pub use resample::{
    bootstrap, bootstrap_name, BootstrapConfig, BootstrapHistograms, BootstrapResult,
};
pub use universe::ReadoutUniverse;
