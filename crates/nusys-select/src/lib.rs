#![deny(missing_docs)]
#![doc = "Lookup index over previously-selected interactions and its table readers."]

/// Event-keyed selection index.
pub mod index;
pub mod source;

pub use index::{ReadoutMap, SelectionIndex, SelectionRow};
pub use source::{read_csv, read_event_log, read_tagged_log, IDENTITY_COLUMNS};
