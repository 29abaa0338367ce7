//! Tabular access to per-file event and weight records.
//!
//! The engine never touches the upstream on-disk format directly. A
//! [`TableReader`] opens one input file by identifier and hands back an
//! [`EventTable`] that yields [`EventRecord`]s in file order together with the
//! exposure declared by the file.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{EventKey, ReadoutKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Table name used by the upstream reconstruction output.
pub const DEFAULT_TABLE: &str = "recTree";

/// One simulated interaction embedded in a readout record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueInteraction {
    /// Interaction index within the readout.
    pub index: i64,
    /// Weight arrays addressed by knob identifier, one multiplier per universe.
    #[serde(default)]
    pub wgt: Vec<Vec<f64>>,
}

/// One readout record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Run number.
    pub run: u32,
    /// Subrun number.
    pub subrun: u32,
    /// Event number.
    pub evt: u32,
    /// Simulated interactions in the readout.
    #[serde(default)]
    pub interactions: Vec<TrueInteraction>,
}

impl EventRecord {
    /// Readout identity of the record.
    pub fn readout(&self) -> ReadoutKey {
        ReadoutKey::new(self.run, self.subrun, self.evt)
    }

    /// Identity of the `interaction`-th embedded interaction.
    pub fn key(&self, interaction: &TrueInteraction) -> EventKey {
        self.readout().interaction(interaction.index)
    }
}

/// Contents of one input file: declared exposure plus named record tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventFile {
    /// Protons-on-target recorded for the file.
    pub total_pot: f64,
    /// Record tables keyed by table name.
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<EventRecord>>,
}

impl EventFile {
    /// Single-table file using [`DEFAULT_TABLE`].
    pub fn with_records(total_pot: f64, records: Vec<EventRecord>) -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(DEFAULT_TABLE.to_string(), records);
        Self { total_pot, tables }
    }
}

/// Sequential cursor over the records of one opened file.
pub trait EventTable {
    /// Exposure declared by the file.
    fn total_pot(&self) -> f64;
    /// Next record in file order, `None` once exhausted.
    fn next_record(&mut self) -> Option<EventRecord>;
}

/// Opens input files by identifier. Shared across worker threads.
pub trait TableReader: Sync {
    /// Cursor type produced by [`TableReader::open`].
    type Table: EventTable;

    /// Opens `file_id`. A missing file or a missing table is an error the
    /// caller treats as recoverable.
    fn open(&self, file_id: &str) -> Result<Self::Table, NusysError>;
}

/// Records of one table, consumed front to back.
#[derive(Debug, Clone, Default)]
pub struct RecordQueue {
    total_pot: f64,
    records: VecDeque<EventRecord>,
}

impl RecordQueue {
    /// Creates a queue over `records`.
    pub fn new(total_pot: f64, records: Vec<EventRecord>) -> Self {
        Self {
            total_pot,
            records: records.into(),
        }
    }

    /// Records left to read.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl EventTable for RecordQueue {
    fn total_pot(&self) -> f64 {
        self.total_pot
    }

    fn next_record(&mut self) -> Option<EventRecord> {
        self.records.pop_front()
    }
}

fn table_missing(file_id: &str, table: &str) -> NusysError {
    NusysError::Io(
        ErrorInfo::new("table_missing", "expected table absent from input file")
            .with_context("file", file_id)
            .with_context("table", table),
    )
}

fn take_table(mut file: EventFile, file_id: &str, table: &str) -> Result<RecordQueue, NusysError> {
    let records = file
        .tables
        .remove(table)
        .ok_or_else(|| table_missing(file_id, table))?;
    Ok(RecordQueue::new(file.total_pot, records))
}

/// Reads JSON-encoded [`EventFile`]s from disk.
#[derive(Debug, Clone)]
pub struct JsonTableReader {
    base_dir: Option<PathBuf>,
    table: String,
}

impl JsonTableReader {
    /// Reader resolving relative identifiers against `base_dir`.
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Overrides the expected table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Path a file identifier resolves to.
    pub fn resolve(&self, file_id: &str) -> PathBuf {
        let path = Path::new(file_id);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl TableReader for JsonTableReader {
    type Table = RecordQueue;

    fn open(&self, file_id: &str) -> Result<RecordQueue, NusysError> {
        let path = self.resolve(file_id);
        let bytes = fs::read(&path).map_err(|err| {
            NusysError::Io(
                ErrorInfo::new("file_open", "failed to open input file")
                    .with_context("file", file_id)
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let file: EventFile = serde_json::from_slice(&bytes).map_err(|err| {
            NusysError::Io(
                ErrorInfo::new("file_decode", "input file is not a valid event file")
                    .with_context("file", file_id)
                    .with_hint(err.to_string()),
            )
        })?;
        debug!(file = file_id, tables = file.tables.len(), "input file opened");
        take_table(file, file_id, &self.table)
    }
}

/// In-memory reader keyed by file identifier.
#[derive(Debug, Clone)]
pub struct MemoryTableReader {
    files: BTreeMap<String, EventFile>,
    table: String,
}

impl Default for MemoryTableReader {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl MemoryTableReader {
    /// Empty reader expecting [`DEFAULT_TABLE`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file under `file_id`.
    pub fn insert(&mut self, file_id: impl Into<String>, file: EventFile) {
        self.files.insert(file_id.into(), file);
    }

    /// Builder form of [`MemoryTableReader::insert`].
    pub fn with_file(mut self, file_id: impl Into<String>, file: EventFile) -> Self {
        self.insert(file_id, file);
        self
    }
}

impl TableReader for MemoryTableReader {
    type Table = RecordQueue;

    fn open(&self, file_id: &str) -> Result<RecordQueue, NusysError> {
        let file = self.files.get(file_id).cloned().ok_or_else(|| {
            NusysError::Io(
                ErrorInfo::new("file_open", "input file not registered").with_context("file", file_id),
            )
        })?;
        take_table(file, file_id, &self.table)
    }
}
