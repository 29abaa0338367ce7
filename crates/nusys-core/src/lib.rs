#![deny(missing_docs)]
#![doc = "Core identity, schema, error and seeding types shared by the nusys systematic-uncertainty engine."]

pub mod diagnostics;
pub mod errors;
pub mod keys;
pub mod provenance;
pub mod rng;
pub mod schema;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use errors::{ErrorInfo, NusysError};
pub use keys::{EventKey, ReadoutKey, COSMIC_INTERACTION_ID};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RngHandle};
pub use schema::{
    default_knobs, default_variables, Binning, KnobRegistry, RecoVar, SystematicKnob,
    VariableSchema,
};
