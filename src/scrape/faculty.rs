//! Faculty catalog entries
//!
//! Entries look like one of:
//!
//! ```text
//! Last, First, Title, Department, College of X. Degree, School, 1999.
//! Last, First, Title of Department, College of X. Degree, School, 1999.
//! Last, First, Title, College of X. Degree, School, 1999.
//! ```

use std::collections::HashSet;
use std::path::Path;
use csv::StringRecord;
use regex::Regex;
use crate::{Error, Result};
use crate::ingest::{FacultyRow, SourceRow};
use crate::model::EntityKind;
use crate::normalize::{KnownEntity, Watermark, canonical, clean, resolve};
use super::{AppendReport, append_rows, read_sink, split_entries};

/// One parsed catalog entry, before it has an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedFaculty {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub title: String,
    /// None when no middle field names a known department
    pub department_id: Option<String>,
    pub college: String,
    pub academic_history: String,
}

impl ScrapedFaculty {
    fn natural_key(&self) -> (String, Option<String>) {
        (canonical(&self.full_name), self.department_id.clone())
    }

    pub fn to_row(&self, faculty_id: String) -> FacultyRow {
        let text = |s: &str| (!s.is_empty()).then(|| s.to_string());
        FacultyRow {
            faculty_id: Some(faculty_id),
            full_name: Some(self.full_name.clone()),
            first_name: text(&self.first_name),
            last_name: text(&self.last_name),
            title: text(&self.title),
            department_id: self.department_id.clone(),
            college: text(&self.college),
            academic_history: text(&self.academic_history),
        }
    }
}

/// Catalog entry parser with its patterns compiled once
pub struct FacultyParser {
    year: Regex,
    sentence_break: Regex,
}

impl FacultyParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            year: Regex::new(r"\b\d{4}\b")?,
            sentence_break: Regex::new(r"\.\s+\p{Lu}")?,
        })
    }

    /// Split at a period followed by whitespace and an uppercase letter, or at
    /// a terminal period. `L., ` style initials inside a sentence do not split.
    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for found in self.sentence_break.find_iter(text) {
            sentences.push(text[start..found.start()].trim().to_string());
            start = found.start() + 1;
        }
        sentences.push(text[start..].trim().trim_end_matches('.').trim().to_string());
        sentences.retain(|s| !s.is_empty());
        sentences
    }

    /// Parse one entry. Returns None when no sentence has at least a last
    /// name, first name and one more field.
    pub fn parse_entry(&self, text: &str, departments: &[KnownEntity]) -> Option<ScrapedFaculty> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let sentences = self.split_sentences(&text);
        if sentences.is_empty() {
            return None;
        }

        let mut history = Vec::new();
        let mut candidates = Vec::new();
        for sentence in &sentences {
            if self.year.is_match(sentence) {
                history.push(sentence.as_str());
            } else if sentence.matches(',').count() >= 2 {
                candidates.push(sentence.as_str());
            }
        }
        if candidates.is_empty() {
            candidates.push(sentences[0].as_str());
        }

        // First sentence naming a college, else the most detailed one
        let main = candidates
            .iter()
            .find(|s| s.contains("College of"))
            .or_else(|| candidates.iter().rev().max_by_key(|s| s.matches(',').count()))?;

        let fields: Vec<&str> = main.split(',').map(str::trim).collect();
        if fields.len() < 3 || fields[0].is_empty() || fields[1].is_empty() {
            return None;
        }
        let last_name = fields[0].to_string();
        let first_name = fields[1].to_string();

        let college_idx = (2..fields.len()).find(|&i| fields[i].contains("College of"));
        let college = college_idx.map(|i| fields[i].to_string()).unwrap_or_default();
        let middle = &fields[2..college_idx.unwrap_or(fields.len())];

        let mut title_parts = Vec::new();
        let mut department_id = None;
        for field in middle {
            match resolve(field, departments) {
                Ok(id) => {
                    department_id = Some(id);
                    break;
                }
                Err(_) => title_parts.push(*field),
            }
        }
        let title = if title_parts.is_empty() {
            middle.first().map(|s| s.to_string()).unwrap_or_default()
        } else {
            title_parts.join(", ")
        };

        Some(ScrapedFaculty {
            full_name: format!("{}, {}", last_name, first_name),
            first_name,
            last_name,
            title,
            department_id,
            college,
            academic_history: history.join(". "),
        })
    }

    /// Parse every blank-line separated entry, logging the ones that do not parse
    pub fn parse_entries(&self, text: &str, departments: &[KnownEntity]) -> Vec<ScrapedFaculty> {
        let mut parsed = Vec::new();
        for entry in split_entries(text) {
            match self.parse_entry(&entry, departments) {
                Some(faculty) => parsed.push(faculty),
                None => {
                    let preview: String = entry.chars().take(60).collect();
                    tracing::warn!(entry = %preview, "could not parse faculty entry");
                }
            }
        }
        tracing::info!(parsed = parsed.len(), "parsed faculty entries");
        parsed
    }
}

/// Watermark over the sink's ids, with ids held elsewhere (the faculty
/// table) marked as taken. Held ids using another scheme are ignored.
fn sink_watermark(prefix: &str, existing: &[SourceRow<FacultyRow>], held: &[String]) -> Result<Watermark> {
    let mut watermark = Watermark::scan(
        prefix,
        existing.iter().filter_map(|row| row.record.faculty_id.as_deref()),
    )?;
    for id in held {
        match watermark.reserve(id) {
            Ok(()) => {}
            Err(Error::MalformedId { .. }) => tracing::debug!(%id, "held id outside the id scheme ignored"),
            Err(err) => return Err(err),
        }
    }
    Ok(watermark)
}

/// Give every faculty row with a blank id a continuing id, written back to
/// the file at `path` so the assignment survives later appends.
///
/// Rows are numbered in file order. `held` lists ids in use outside the file.
/// Returns the ids assigned; a file with no blank ids is left untouched.
pub fn fill_missing_ids(path: &Path, prefix: &str, held: &[String]) -> Result<Vec<String>> {
    let existing: Vec<SourceRow<FacultyRow>> = read_sink(EntityKind::Faculty, path)?;
    if existing.iter().all(|row| clean(&row.record.faculty_id).is_some()) {
        return Ok(Vec::new());
    }
    let mut watermark = sink_watermark(prefix, &existing, held)?;

    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let header = reader.headers()?.clone();
    let Some(id_column) = header.iter().position(|h| h.trim() == "faculty_id") else {
        return Err(Error::SchemaMismatch {
            entity: EntityKind::Faculty,
            missing: vec!["faculty_id".to_string()],
            extra: Vec::new(),
        });
    };

    let mut assigned = Vec::new();
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let blank_id = record.get(id_column).is_some_and(|id| id.trim().is_empty());
        if !blank_id || record.iter().all(|field| field.trim().is_empty()) {
            records.push(record);
            continue;
        }
        let id = watermark.allocate()?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        tracing::info!(line, %id, "assigned faculty id");
        let filled: StringRecord = record
            .iter()
            .enumerate()
            .map(|(idx, field)| if idx == id_column { id.as_str() } else { field })
            .collect();
        records.push(filled);
        assigned.push(id);
    }

    let staged = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&staged)?;
        writer.write_record(&header)?;
        for record in &records {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&staged, path)?;
    tracing::info!(assigned = assigned.len(), path = %path.display(), "faculty ids written back");
    Ok(assigned)
}

/// Append records to the faculty CSV at `path`.
///
/// Ids continue from the highest id already in the file and never land on
/// one of the `held` ids. Records whose (full name, department) is already
/// present, in the file or earlier in the batch, are skipped.
pub fn append_faculty(
    path: &Path,
    records: &[ScrapedFaculty],
    prefix: &str,
    held: &[String],
) -> Result<AppendReport> {
    let existing: Vec<SourceRow<FacultyRow>> = read_sink(EntityKind::Faculty, path)?;
    let mut watermark = sink_watermark(prefix, &existing, held)?;
    let mut keys: HashSet<(String, Option<String>)> = existing
        .iter()
        .filter_map(|row| {
            let name = clean(&row.record.full_name)?;
            Some((canonical(&name), clean(&row.record.department_id)))
        })
        .collect();

    let mut report = AppendReport::default();
    let mut rows = Vec::new();
    for record in records {
        if !keys.insert(record.natural_key()) {
            tracing::warn!(full_name = %record.full_name, "faculty already in sink, skipped");
            report.skipped_existing += 1;
            continue;
        }
        let id = watermark.allocate()?;
        rows.push(record.to_row(id.clone()));
        report.appended.push(id);
    }

    append_rows(EntityKind::Faculty, path, &rows)?;
    tracing::info!(
        appended = report.appended.len(),
        skipped = report.skipped_existing,
        path = %path.display(),
        "faculty sink updated"
    );
    Ok(report)
}
