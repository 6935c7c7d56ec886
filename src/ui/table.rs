use tabled::{settings::Style, Table, Tabled};
use crate::loader::LoadSummary;
use crate::storage::{DbStats, ForeignKeyIssue};

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

#[derive(Tabled)]
struct LoadRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows written")]
    rows: usize,
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Row id")]
    rowid: String,
    #[tabled(rename = "Missing parent")]
    parent: String,
}

fn render<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Row counts and short fingerprints per table
pub fn stats_table(stats: &DbStats) -> String {
    let rows: Vec<StatsRow> = stats
        .tables
        .iter()
        .map(|t| StatsRow {
            table: t.table.clone(),
            rows: t.rows,
            fingerprint: t.fingerprint.chars().take(16).collect(),
        })
        .collect();
    render(&rows)
}

pub fn load_table(summary: &LoadSummary) -> String {
    let rows: Vec<LoadRow> = summary
        .tables
        .iter()
        .map(|(entity, rows)| LoadRow {
            table: entity.table_name().to_string(),
            rows: *rows,
        })
        .collect();
    render(&rows)
}

pub fn foreign_key_table(issues: &[ForeignKeyIssue]) -> String {
    let rows: Vec<IssueRow> = issues
        .iter()
        .map(|issue| IssueRow {
            table: issue.table.clone(),
            rowid: issue.rowid.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            parent: issue.parent.clone(),
        })
        .collect();
    render(&rows)
}
