//! Scraped entry parsers
//!
//! Turn the text of catalog faculty entries and grant announcements into rows
//! that follow the CSV column contract, and append them to a sink file with
//! continuing ids. Fetching pages and pulling the entry text out of HTML
//! happens before this module; input is plain text, one entry per block,
//! blocks separated by blank lines.

pub mod faculty;
pub mod grants;

use std::fs::OpenOptions;
use std::path::Path;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use crate::{Error, Result};
use crate::ingest::{self, ColumnContract, SourceRow};
use crate::model::EntityKind;

/// Split extracted page text into entries at blank lines
pub fn split_entries(text: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                entries.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        entries.push(current.join("\n"));
    }
    entries
}

/// Rows already in a sink. Absent and zero-length files are empty sinks.
pub(crate) fn read_sink<T: DeserializeOwned>(entity: EntityKind, path: &Path) -> Result<Vec<SourceRow<T>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => ingest::read_file(entity, path, false),
        _ => Ok(Vec::new()),
    }
}

/// Header of an existing sink; None when the file is absent or empty
fn sink_header(path: &Path) -> Result<Option<Vec<String>>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {
            let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
            Ok(Some(reader.headers()?.iter().map(str::to_string).collect()))
        }
        _ => Ok(None),
    }
}

/// Column layout for a new sink: required columns, then optional ones
fn contract_header(entity: EntityKind) -> Vec<String> {
    let contract = ColumnContract::for_entity(entity);
    contract
        .required
        .iter()
        .chain(contract.optional)
        .map(|col| col.to_string())
        .collect()
}

/// Field values of a row keyed by column name
fn row_fields<T: Serialize>(row: &T) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(row) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("sink row serialized to {other}, expected named fields"),
        ))),
        Err(err) => Err(Error::Io(err.into())),
    }
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Append rows to a CSV sink.
///
/// Values are written in the column order of the sink's own header. A new or
/// empty sink gets the contract header first. A row carrying a value for a
/// column the header lacks fails the whole append before anything is written.
pub(crate) fn append_rows<T: Serialize>(entity: EntityKind, path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let existing = sink_header(path)?;
    let is_new = existing.is_none();
    let header = existing.unwrap_or_else(|| contract_header(entity));

    let mut records = Vec::with_capacity(rows.len());
    let mut missing: Vec<String> = Vec::new();
    for row in rows {
        let fields = row_fields(row)?;
        for (column, value) in &fields {
            if !field_text(Some(value)).is_empty() && !header.contains(column) && !missing.contains(column) {
                missing.push(column.clone());
            }
        }
        records.push(header.iter().map(|col| field_text(fields.get(col))).collect::<Vec<_>>());
    }
    if !missing.is_empty() {
        return Err(Error::SchemaMismatch {
            entity,
            missing,
            extra: Vec::new(),
        });
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(&header)?;
    }
    for record in &records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), rows = rows.len(), header = is_new, "appended rows");
    Ok(())
}

/// What an append run did
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppendReport {
    /// Ids assigned to the appended rows, in order
    pub appended: Vec<String>,
    /// Records already present in the sink
    pub skipped_existing: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_entries() {
        let text = "\n  first line\nsecond line\n\n\n third \n";
        assert_eq!(split_entries(text), vec!["first line\nsecond line", "third"]);
        assert!(split_entries("  \n\n").is_empty());
    }
}
