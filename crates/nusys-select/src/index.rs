use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{Diagnostic, Diagnostics, EventKey, ReadoutKey, VariableSchema};
use nusys_hist::{FlowPolicy, Histogram1D};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One selected interaction as produced by the selection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRow {
    /// Interaction identity.
    pub key: EventKey,
    /// One value per schema variable, in schema order.
    pub values: Vec<f64>,
}

impl SelectionRow {
    /// Creates a row.
    pub fn new(key: EventKey, values: Vec<f64>) -> Self {
        Self { key, values }
    }
}

/// Readout → selected interactions of that readout, in key order.
pub type ReadoutMap = BTreeMap<ReadoutKey, Vec<EventKey>>;

/// Immutable lookup table of selected interactions keyed by [`EventKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionIndex {
    variables: Vec<String>,
    entries: BTreeMap<EventKey, Vec<f64>>,
    duplicates: usize,
    #[serde(default)]
    diagnostics: Diagnostics,
}

impl SelectionIndex {
    /// Builds the index. Each row must carry exactly one value per schema
    /// variable. A repeated key overwrites the earlier row and is reported as
    /// a warning.
    pub fn build<I>(schema: &VariableSchema, rows: I) -> Result<Self, NusysError>
    where
        I: IntoIterator<Item = SelectionRow>,
    {
        let mut entries = BTreeMap::new();
        let mut duplicates = 0usize;
        let mut diagnostics = Diagnostics::new();
        for (position, row) in rows.into_iter().enumerate() {
            if row.values.len() != schema.len() {
                return Err(NusysError::Selection(
                    ErrorInfo::new("selection_row_width", "row value count differs from schema")
                        .with_context("row", position.to_string())
                        .with_context("key", row.key.to_string())
                        .with_context("expected", schema.len().to_string())
                        .with_context("found", row.values.len().to_string()),
                ));
            }
            match entries.entry(row.key) {
                Entry::Occupied(mut slot) => {
                    duplicates += 1;
                    diagnostics.push(Diagnostic::warning(
                        "selection_duplicate",
                        format!("interaction {} selected twice; keeping the later row", row.key),
                    ));
                    slot.insert(row.values);
                }
                Entry::Vacant(slot) => {
                    slot.insert(row.values);
                }
            }
        }
        debug!(entries = entries.len(), duplicates, "selection index built");
        Ok(Self {
            variables: schema.names().into_iter().map(str::to_string).collect(),
            entries,
            duplicates,
            diagnostics,
        })
    }

    /// Variable names the value vectors follow.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Fails with `selection_schema` unless the value vectors follow
    /// `schema`'s variables in the same order.
    pub fn ensure_schema(&self, schema: &VariableSchema) -> Result<(), NusysError> {
        let expected = schema.names();
        if self.variables.iter().map(String::as_str).eq(expected.iter().copied()) {
            return Ok(());
        }
        Err(NusysError::Selection(
            ErrorInfo::new(
                "selection_schema",
                "selection index was built over a different variable schema",
            )
            .with_context("index_variables", self.variables.join(","))
            .with_context("schema_variables", expected.join(",")),
        ))
    }

    /// Value vector of a selected interaction.
    pub fn get(&self, key: &EventKey) -> Option<&[f64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Whether the interaction was selected.
    pub fn contains(&self, key: &EventKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of selected interactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows that overwrote an earlier row with the same key.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Warnings recorded during construction.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &[f64])> {
        self.entries.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Selected cosmic candidates (interaction id `-1`).
    pub fn cosmics(&self) -> impl Iterator<Item = (&EventKey, &[f64])> {
        self.iter().filter(|(key, _)| key.is_cosmic())
    }

    /// Groups the selected interactions by readout.
    pub fn readouts(&self) -> ReadoutMap {
        let mut map = ReadoutMap::new();
        for key in self.entries.keys() {
            map.entry(key.readout()).or_default().push(*key);
        }
        map
    }

    /// Unweighted distribution of variable `variable` over every selected
    /// interaction.
    pub fn histogram(
        &self,
        schema: &VariableSchema,
        variable: usize,
        name: impl Into<String>,
        flow: FlowPolicy,
    ) -> Histogram1D {
        let mut hist = Histogram1D::with_flow(name, schema.variables()[variable].binning(), flow);
        for values in self.entries.values() {
            hist.fill(values[variable], 1.0);
        }
        hist
    }
}
