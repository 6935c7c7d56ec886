//! Grant announcements
//!
//! Two layouts appear on the announcements page:
//!
//! ```text
//! Kai Zeng receives funding from NSF for Secure Spectrum Sharing.
//! Anticipated funding: $100,000
//! January 12, 2026
//!
//! Brian L. Mark and Kai Zeng received funding from DARPA for X. Grant total: $1.5M.
//! March 3, 2023
//! ```
//!
//! Every awardee becomes its own row with its own grant id.

use std::collections::HashSet;
use std::path::Path;
use regex::Regex;
use serde::Serialize;
use crate::Result;
use crate::ingest::{GrantRow, SourceRow};
use crate::model::EntityKind;
use crate::normalize::{Watermark, canonical, clean, parse_date, parse_funding};
use super::{AppendReport, append_rows, read_sink, split_entries};

/// One parsed announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedGrant {
    pub awardees: Vec<String>,
    pub sponsor: String,
    pub title: String,
    pub funding: Option<i64>,
    pub is_anticipated: bool,
    /// ISO date, when the entry has a parseable one
    pub date: Option<String>,
}

type GrantKey = (String, String, String, String);

impl ScrapedGrant {
    fn key_for(&self, awardee: &str) -> GrantKey {
        (
            canonical(awardee),
            canonical(&self.sponsor),
            canonical(&self.title),
            self.date.clone().unwrap_or_default(),
        )
    }

    /// Row for one awardee. Department and capability are left for review.
    pub fn to_row(&self, grant_id: String, awardee: &str) -> GrantRow {
        GrantRow {
            grant_id: Some(grant_id),
            funding: self.funding.map(|f| f.to_string()),
            sponsor: Some(self.sponsor.clone()),
            awardee: Some(awardee.to_string()),
            title: (!self.title.is_empty()).then(|| self.title.clone()),
            date: self.date.clone(),
            is_anticipated: Some(self.is_anticipated.to_string()),
            department_id: None,
            capabilities_id: None,
            faculty_id: None,
        }
    }
}

fn row_key(row: &GrantRow) -> GrantKey {
    let text = |v: &Option<String>| clean(v).map(|s| canonical(&s)).unwrap_or_default();
    (
        text(&row.awardee),
        text(&row.sponsor),
        text(&row.title),
        clean(&row.date).unwrap_or_default(),
    )
}

/// Split an awardee list on commas and "and"
pub fn split_awardees(text: &str) -> Vec<String> {
    text.replace(" and ", ", ")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("and"))
        .map(str::to_string)
        .collect()
}

/// Compiled patterns for announcement text
pub struct GrantParser {
    detail_line: Regex,
    detail: Regex,
    title_tail: Regex,
    inline_funding: Regex,
    amount: Regex,
}

impl GrantParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            detail_line: Regex::new(r"(?i)receive[sd]?\s+funding\s+from")?,
            detail: Regex::new(
                r"(?i)^(.+?)\s+receive[sd]?\s+funding\s+from\s+(.+?)(?:\s+for\s+(.+?))?(?:\s*(?:Anticipated funding|Grant total|Award amount|Award))?\.?\s*$",
            )?,
            title_tail: Regex::new(
                r#"(?i)[."']?\s*(?:Anticipated funding|Grant total|Award amount|Award)[:\s]+\$.*$"#,
            )?,
            inline_funding: Regex::new(
                r"(?i)(?:Grant total|Anticipated funding|Award amount)[:\s]+\$\s*[\d,]+(?:\.\d+)?\s*[MK]?",
            )?,
            amount: Regex::new(r"\$\s*([\d,]+(?:\.\d+)?)\s*([MmKk])?")?,
        })
    }

    /// Dollar amount in a funding line, and whether it is anticipated
    pub fn parse_amount(&self, text: &str) -> (Option<i64>, bool) {
        let is_anticipated = text.to_lowercase().contains("anticipated");
        let funding = self.amount.captures(text).and_then(|caps| {
            let digits = caps.get(1).map_or("", |m| m.as_str());
            let suffix = caps.get(2).map_or("", |m| m.as_str());
            parse_funding(Some(&format!("{digits}{suffix}"))).ok().flatten()
        });
        (funding, is_anticipated)
    }

    /// Parse one announcement; None when it has no "receive(s|d) funding from" line
    pub fn parse_entry(&self, text: &str) -> Option<ScrapedGrant> {
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() < 2 {
            return None;
        }

        // Prefer a detail line that carries a title
        let detail = lines
            .iter()
            .find(|l| self.detail_line.is_match(l) && l.to_lowercase().contains(" for "))
            .or_else(|| lines.iter().find(|l| self.detail_line.is_match(l)))?;

        let caps = self.detail.captures(detail)?;
        let awardees = split_awardees(caps.get(1)?.as_str());
        let sponsor = caps.get(2)?.as_str().trim().to_string();
        let raw_title = caps.get(3).map_or("", |m| m.as_str());
        let title = self
            .title_tail
            .replace(raw_title, "")
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .trim_end_matches('.')
            .trim()
            .to_string();

        let (funding, is_anticipated) = match self.inline_funding.find(detail) {
            Some(m) => self.parse_amount(m.as_str()),
            None => lines
                .iter()
                .filter(|l| {
                    let lower = l.to_lowercase();
                    l.contains('$') && ["funding", "award", "grant"].iter().any(|w| lower.contains(w))
                })
                .map(|l| self.parse_amount(l))
                .find(|(funding, _)| funding.is_some())
                .unwrap_or((None, false)),
        };

        let date = lines
            .iter()
            .rev()
            .filter(|l| !l.contains('$') && !l.to_lowercase().contains("funding"))
            .find_map(|l| parse_date(l))
            .map(|d| d.format("%Y-%m-%d").to_string());

        Some(ScrapedGrant {
            awardees,
            sponsor,
            title,
            funding,
            is_anticipated,
            date,
        })
    }

    /// Parse every blank-line separated entry, logging the ones that do not parse
    pub fn parse_entries(&self, text: &str) -> Vec<ScrapedGrant> {
        let mut parsed = Vec::new();
        for entry in split_entries(text) {
            match self.parse_entry(&entry) {
                Some(grant) => parsed.push(grant),
                None => {
                    let preview: String = entry.chars().take(60).collect();
                    tracing::warn!(entry = %preview, "could not parse grant entry");
                }
            }
        }
        tracing::info!(parsed = parsed.len(), "parsed grant entries");
        parsed
    }
}

/// Append one row per awardee to the grants CSV at `path`.
///
/// Ids continue from the highest id already in the file; an awardee row
/// with the same sponsor, title and date as an existing row is skipped.
pub fn append_grants(path: &Path, grants: &[ScrapedGrant], prefix: &str) -> Result<AppendReport> {
    let existing: Vec<SourceRow<GrantRow>> = read_sink(EntityKind::Grant, path)?;
    let mut watermark = Watermark::scan(
        prefix,
        existing.iter().filter_map(|row| row.record.grant_id.as_deref()),
    )?;
    let mut keys: HashSet<GrantKey> = existing.iter().map(|row| row_key(&row.record)).collect();

    let mut report = AppendReport::default();
    let mut rows = Vec::new();
    for grant in grants {
        for awardee in &grant.awardees {
            if !keys.insert(grant.key_for(awardee)) {
                tracing::warn!(%awardee, sponsor = %grant.sponsor, "grant already in sink, skipped");
                report.skipped_existing += 1;
                continue;
            }
            let id = watermark.allocate()?;
            rows.push(grant.to_row(id.clone(), awardee));
            report.appended.push(id);
        }
    }

    append_rows(EntityKind::Grant, path, &rows)?;
    tracing::info!(
        appended = report.appended.len(),
        skipped = report.skipped_existing,
        path = %path.display(),
        "grant sink updated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_FORMAT: &str = "Kai Zeng receives funding from National Science Foundation for Secure Spectrum Sharing.\n\
                              Anticipated funding: $100,000\n\
                              January 12, 2026";

    const OLD_FORMAT: &str = "Brian L. Mark and Kai Zeng received funding from DARPA for \"Resilient Links.\" Grant total: $1.5M.\n\
                              March 3, 2023.";

    #[test]
    fn test_split_awardees() {
        assert_eq!(split_awardees("Kai Zeng"), vec!["Kai Zeng"]);
        assert_eq!(split_awardees("Brian L. Mark and Kai Zeng"), vec!["Brian L. Mark", "Kai Zeng"]);
        assert_eq!(
            split_awardees("Bo Han, Parth Pathak, and Lap Fai Yu"),
            vec!["Bo Han", "Parth Pathak", "Lap Fai Yu"]
        );
    }

    #[test]
    fn test_parse_new_format() {
        let parser = GrantParser::new().unwrap();
        let grant = parser.parse_entry(NEW_FORMAT).unwrap();
        assert_eq!(grant.awardees, vec!["Kai Zeng"]);
        assert_eq!(grant.sponsor, "National Science Foundation");
        assert_eq!(grant.title, "Secure Spectrum Sharing");
        assert_eq!(grant.funding, Some(100_000));
        assert!(grant.is_anticipated);
        assert_eq!(grant.date.as_deref(), Some("2026-01-12"));
    }

    #[test]
    fn test_parse_old_format() {
        let parser = GrantParser::new().unwrap();
        let grant = parser.parse_entry(OLD_FORMAT).unwrap();
        assert_eq!(grant.awardees, vec!["Brian L. Mark", "Kai Zeng"]);
        assert_eq!(grant.sponsor, "DARPA");
        assert_eq!(grant.title, "Resilient Links");
        assert_eq!(grant.funding, Some(1_500_000));
        assert!(!grant.is_anticipated);
        assert_eq!(grant.date.as_deref(), Some("2023-03-03"));
    }

    #[test]
    fn test_parse_without_title() {
        let parser = GrantParser::new().unwrap();
        let grant = parser
            .parse_entry("Bo Han receives funding from Commonwealth Cyber Initiative\nAward amount: $15K\nMay 1, 2025")
            .unwrap();
        assert_eq!(grant.sponsor, "Commonwealth Cyber Initiative");
        assert_eq!(grant.title, "");
        assert_eq!(grant.funding, Some(15_000));
    }

    #[test]
    fn test_parse_rejects_other_text() {
        let parser = GrantParser::new().unwrap();
        assert_eq!(parser.parse_entry("News\nJanuary 12, 2026"), None);
        assert_eq!(parser.parse_entry("Kai Zeng receives funding from NSF"), None);
    }

    #[test]
    fn test_append_follows_sink_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.csv");
        std::fs::write(
            &path,
            "grant_id,funding,sponsor,awardee,title,date,department_id,capabilities_id,faculty_id,is_anticipated\n\
             G00001,5000,NSF,Kai Zeng,,2025-05-01,CS,,,false\n",
        )
        .unwrap();
        let parser = GrantParser::new().unwrap();
        let grants = parser.parse_entries(NEW_FORMAT);

        let report = append_grants(&path, &grants, "G").unwrap();
        assert_eq!(report.appended, vec!["G00002"]);

        let rows: Vec<SourceRow<GrantRow>> = crate::ingest::read_file(EntityKind::Grant, &path, true).unwrap();
        assert_eq!(rows.len(), 2);
        let appended = &rows[1].record;
        assert_eq!(appended.date.as_deref(), Some("2026-01-12"));
        assert_eq!(appended.is_anticipated.as_deref(), Some("true"));
        assert_eq!(appended.department_id, None);
        assert_eq!(appended.faculty_id, None);
    }

    #[test]
    fn test_append_to_sink_lacking_a_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.csv");
        let original = "grant_id,funding,sponsor,awardee,title,date,department_id\n\
                        G00001,5000,NSF,Kai Zeng,,2025-05-01,CS\n";
        std::fs::write(&path, original).unwrap();
        let parser = GrantParser::new().unwrap();
        let grants = parser.parse_entries(NEW_FORMAT);

        let err = append_grants(&path, &grants, "G").unwrap_err();
        match err {
            crate::Error::SchemaMismatch { entity, missing, extra } => {
                assert_eq!(entity, EntityKind::Grant);
                assert_eq!(missing, vec!["is_anticipated"]);
                assert!(extra.is_empty());
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_append_one_row_per_awardee() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.csv");
        let parser = GrantParser::new().unwrap();
        let grants = parser.parse_entries(&format!("{NEW_FORMAT}\n\n{OLD_FORMAT}\n"));
        assert_eq!(grants.len(), 2);

        let report = append_grants(&path, &grants, "G").unwrap();
        assert_eq!(report.appended, vec!["G00001", "G00002", "G00003"]);

        let again = append_grants(&path, &grants, "G").unwrap();
        assert!(again.appended.is_empty());
        assert_eq!(again.skipped_existing, 3);

        let rows: Vec<SourceRow<GrantRow>> = crate::ingest::read_file(EntityKind::Grant, &path, true).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].record.awardee.as_deref(), Some("Kai Zeng"));
        assert_eq!(rows[2].record.funding.as_deref(), Some("1500000"));
        assert_eq!(rows[0].record.is_anticipated.as_deref(), Some("true"));
    }
}
