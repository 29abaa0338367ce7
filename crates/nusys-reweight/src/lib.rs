#![deny(missing_docs)]
#![doc = "Multi-universe histogram accumulation for continuous systematic knobs across many input files."]

/// Accumulation context and histogram pairs.
pub mod context;
/// File list parsing.
pub mod filelist;
/// File-parallel driver.
pub mod parallel;
pub mod reader;

pub use context::{KnobHistograms, ReweightContext, ReweightStats};
pub use filelist::{load_file_list, parse_file_list};
pub use parallel::accumulate_parallel;
pub use reader::{
    EventFile, EventRecord, EventTable, JsonTableReader, MemoryTableReader, RecordQueue,
    TableReader, TrueInteraction, DEFAULT_TABLE,
};
