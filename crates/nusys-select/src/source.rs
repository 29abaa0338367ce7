//! Readers for the selected-interaction table produced upstream.
//!
//! Two layouts are understood: a headed CSV table and the tagged log emitted
//! by the selection job, where each relevant line starts with a tag such as
//! `SELECTED_1MU1P` or `EVENT` followed by comma-separated values.

use std::collections::BTreeSet;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{EventKey, ReadoutKey, VariableSchema};
use tracing::info;

use crate::index::{SelectionIndex, SelectionRow};

/// Identity columns every selection table starts with.
pub const IDENTITY_COLUMNS: [&str; 4] = ["run", "subrun", "event", "nu_id"];

fn missing_column(path: &Path, kind: &str, name: &str) -> NusysError {
    NusysError::Selection(
        ErrorInfo::new("selection_missing_column", format!("{kind} column missing"))
            .with_context("file", path.display().to_string())
            .with_context(kind, name),
    )
}

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> NusysError {
    NusysError::Io(
        ErrorInfo::new(code, "failed to read selection table")
            .with_context("file", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

/// Parses an integral identity field. Upstream writes these as doubles.
fn parse_integral(field: &str) -> Option<f64> {
    let value: f64 = field.trim().parse().ok()?;
    (value.is_finite() && value.fract() == 0.0).then_some(value)
}

fn parse_unsigned(field: &str) -> Option<u32> {
    let value = parse_integral(field)?;
    (value >= 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}

fn parse_signed(field: &str) -> Option<i64> {
    let value = parse_integral(field)?;
    (value.abs() < 9.0e15).then_some(value as i64)
}

fn parse_value(field: &str) -> Option<f64> {
    field.trim().parse().ok()
}

/// Column positions of the identity fields and of each schema variable.
struct ColumnMap {
    identity: [usize; 4],
    variables: Vec<(usize, String)>,
}

impl ColumnMap {
    fn resolve(columns: &[&str], schema: &VariableSchema, path: &Path) -> Result<Self, NusysError> {
        let find = |name: &str| columns.iter().position(|column| column.trim() == name);
        let mut identity = [0usize; 4];
        for (slot, name) in IDENTITY_COLUMNS.iter().enumerate() {
            let position = match (*name, find(name)) {
                (_, Some(position)) => Some(position),
                ("nu_id", None) => find("interaction_id"),
                _ => None,
            };
            identity[slot] = position.ok_or_else(|| missing_column(path, "column", name))?;
        }
        let variables = schema
            .iter()
            .map(|var| {
                find(&var.name)
                    .map(|position| (position, var.name.clone()))
                    .ok_or_else(|| missing_column(path, "variable", &var.name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            identity,
            variables,
        })
    }

    fn row(&self, fields: &[&str], line: usize, path: &Path) -> Result<SelectionRow, NusysError> {
        let field = |position: usize| fields.get(position).copied().unwrap_or("");
        let bad = |column: &str| {
            NusysError::Selection(
                ErrorInfo::new("selection_parse", "unparseable field")
                    .with_context("file", path.display().to_string())
                    .with_context("line", line.to_string())
                    .with_context("column", column.to_string()),
            )
        };
        let run = parse_unsigned(field(self.identity[0])).ok_or_else(|| bad("run"))?;
        let subrun = parse_unsigned(field(self.identity[1])).ok_or_else(|| bad("subrun"))?;
        let event = parse_unsigned(field(self.identity[2])).ok_or_else(|| bad("event"))?;
        let nu_id = parse_signed(field(self.identity[3])).ok_or_else(|| bad("nu_id"))?;
        let values = self
            .variables
            .iter()
            .map(|(position, name)| parse_value(field(*position)).ok_or_else(|| bad(name)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SelectionRow::new(
            EventKey::new(run, subrun, event, nu_id),
            values,
        ))
    }
}

/// Reads a headed CSV selection table. Variable columns are matched to the
/// schema by name; unknown columns are ignored.
pub fn read_csv(path: &Path, schema: &VariableSchema) -> Result<SelectionIndex, NusysError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| wrap_csv("selection_open", path, err))?;
    let headers = reader
        .headers()
        .map_err(|err| wrap_csv("selection_header", path, err))?
        .clone();
    let columns: Vec<&str> = headers.iter().collect();
    let map = ColumnMap::resolve(&columns, schema, path)?;
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|err| wrap_csv("selection_record", path, err))?;
        let fields: Vec<&str> = record.iter().collect();
        rows.push(map.row(&fields, line + 2, path)?);
    }
    let index = SelectionIndex::build(schema, rows)?;
    info!(file = %path.display(), selected = index.len(), "selection table loaded");
    Ok(index)
}

/// Reads every record of a tagged log whose first field contains `tag`,
/// dropping the tag field and a trailing empty field.
fn tagged_records(path: &Path, tag: &str) -> Result<Vec<(usize, StringRecord)>, NusysError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|err| wrap_csv("selection_open", path, err))?;
    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|err| wrap_csv("selection_record", path, err))?;
        if !record.get(0).is_some_and(|first| first.contains(tag)) {
            continue;
        }
        let mut payload: Vec<&str> = record.iter().skip(1).collect();
        if payload.last() == Some(&"") {
            payload.pop();
        }
        out.push((line + 1, StringRecord::from(payload)));
    }
    Ok(out)
}

/// Reads the selected interactions tagged `tag` from a selection log.
/// `columns` names the payload fields after the four identity fields.
pub fn read_tagged_log(
    path: &Path,
    tag: &str,
    columns: &[String],
    schema: &VariableSchema,
) -> Result<SelectionIndex, NusysError> {
    let header: Vec<&str> = IDENTITY_COLUMNS
        .iter()
        .copied()
        .chain(columns.iter().map(String::as_str))
        .collect();
    let map = ColumnMap::resolve(&header, schema, path)?;
    let rows = tagged_records(path, tag)?
        .into_iter()
        .map(|(line, record)| {
            let fields: Vec<&str> = record.iter().collect();
            map.row(&fields, line, path)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let index = SelectionIndex::build(schema, rows)?;
    info!(file = %path.display(), tag, selected = index.len(), "selection log loaded");
    Ok(index)
}

/// Reads the processed readouts tagged `tag` (typically `EVENT`) from a
/// selection log. Repeated readouts are collapsed.
pub fn read_event_log(path: &Path, tag: &str) -> Result<BTreeSet<ReadoutKey>, NusysError> {
    let mut readouts = BTreeSet::new();
    for (line, record) in tagged_records(path, tag)? {
        let field = |n: usize| record.get(n).unwrap_or("");
        let parsed = (
            parse_unsigned(field(0)),
            parse_unsigned(field(1)),
            parse_unsigned(field(2)),
        );
        match parsed {
            (Some(run), Some(subrun), Some(event)) => {
                readouts.insert(ReadoutKey::new(run, subrun, event));
            }
            _ => {
                return Err(NusysError::Selection(
                    ErrorInfo::new("event_parse", "unparseable readout identity")
                        .with_context("file", path.display().to_string())
                        .with_context("line", line.to_string()),
                ))
            }
        }
    }
    Ok(readouts)
}
