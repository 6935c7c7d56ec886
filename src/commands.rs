use std::path::Path;
use anyhow::Context;
use crate::{OutputMode, emit_success};
use cecdb::config::{self, CecConfig};
use cecdb::ingest::{self, DepartmentRow, SourceRow};
use cecdb::normalize::{KnownEntity, NormalizeReport};
use cecdb::scrape::{faculty, grants, AppendReport};
use cecdb::ui::{self, Icons};
use cecdb::{CecStore, Dataset, EntityKind, Loader, Normalizer};

fn open_store(config: &CecConfig) -> anyhow::Result<CecStore> {
    let path = config.database_path();
    config::ensure_db_dir(&path)?;
    CecStore::open(&path).with_context(|| format!("opening database {}", path.display()))
}

/// Faculty ids in the store, which new ids must not reuse. Empty for a store
/// without a schema.
fn held_faculty_ids(store: &CecStore) -> anyhow::Result<Vec<String>> {
    if !store.has_schema()? {
        return Ok(Vec::new());
    }
    Ok(store.faculty_ids()?)
}

/// Ids written back to the faculty CSV for rows that had none
fn fill_faculty_ids(config: &CecConfig, held: &[String]) -> anyhow::Result<Vec<String>> {
    let path = config.source_paths().faculty;
    faculty::fill_missing_ids(&path, &config.faculty_id_prefix, held)
        .with_context(|| format!("assigning faculty ids in {}", path.display()))
}

/// Read every source CSV and normalize it
fn prepare(config: &CecConfig) -> anyhow::Result<(Dataset, NormalizeReport)> {
    let paths = config.source_paths();
    let raw = ingest::read_sources(&paths)
        .with_context(|| format!("reading sources from {}", config.data_dir().display()))?;
    let normalizer = Normalizer::new(config.unresolved).with_faculty_prefix(&config.faculty_id_prefix);
    Ok(normalizer.normalize(&raw)?)
}

fn report_normalization(report: &NormalizeReport) {
    if !report.skipped.is_empty() {
        ui::warn(&format!("{} row(s) skipped for unresolved references", report.skipped.len()));
        for row in &report.skipped {
            ui::skipped_row(row);
        }
    }
    if report.deduplicated > 0 {
        ui::info("Duplicates dropped", &report.deduplicated.to_string());
    }
    if !report.assigned_ids.is_empty() {
        ui::info("Faculty ids assigned", &report.assigned_ids.join(", "));
    }
}

pub fn run_init(config_path: &Path, config: &CecConfig, force: bool) -> anyhow::Result<()> {
    ui::header("Initializing cecdb");
    config::write_config(config_path, config, force)?;
    std::fs::create_dir_all(config.data_dir())
        .with_context(|| format!("creating data directory {}", config.data_dir().display()))?;

    let mut store = open_store(config)?;
    store.apply_schema()?;

    ui::info("Config", &config_path.display().to_string());
    ui::info("Data directory", &config.data_dir().display().to_string());
    ui::info("Database", &config.database_path().display().to_string());
    ui::success("Schema applied");
    Ok(())
}

pub fn run_schema(config: &CecConfig, reset: bool) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    if reset {
        store.reset_schema()?;
        ui::success("Schema reset; all tables are empty");
    } else {
        store.apply_schema()?;
        ui::success("Schema applied");
    }
    Ok(())
}

pub fn run_load(config: &CecConfig, output_mode: OutputMode) -> anyhow::Result<()> {
    run_replace(config, output_mode, false)
}

pub fn run_rebuild(config: &CecConfig, output_mode: OutputMode) -> anyhow::Result<()> {
    run_replace(config, output_mode, true)
}

fn run_replace(config: &CecConfig, output_mode: OutputMode, rebuild: bool) -> anyhow::Result<()> {
    let command = if rebuild { "rebuild" } else { "load" };
    if output_mode.is_human() {
        ui::header(&format!("{} {}", if rebuild { "Rebuilding" } else { "Loading" }, config.database));
        ui::info("Sources", &config.data_dir().display().to_string());
        ui::info("Unresolved policy", &config.unresolved.to_string());
    }

    let mut store = open_store(config)?;
    let held = held_faculty_ids(&store)?;
    let filled = fill_faculty_ids(config, &held)?;
    let (dataset, report) = prepare(config)?;
    if output_mode.is_human() {
        if !filled.is_empty() {
            ui::info("Faculty ids written to source", &filled.join(", "));
        }
        report_normalization(&report);
    }

    let mut loader = Loader::new(&mut store)?;
    let summary = if rebuild {
        loader.rebuild(&dataset)?
    } else {
        loader.load(&dataset).context("load failed; run `cecdb schema` or `cecdb rebuild` first if the store is new")?
    };

    if output_mode.is_human() {
        ui::section("Tables");
        println!("{}", ui::load_table(&summary));
        ui::success(&format!("{} rows committed", summary.total()));
    } else {
        let data = serde_json::json!({
            "tables": summary.tables.iter().map(|(entity, rows)| {
                serde_json::json!({ "table": entity.table_name(), "rows": rows })
            }).collect::<Vec<_>>(),
            "skipped": report.skipped.iter().map(|row| row.to_string()).collect::<Vec<_>>(),
            "deduplicated": report.deduplicated,
            "assigned_ids": report.assigned_ids,
            "written_back_ids": filled,
        });
        emit_success(output_mode, command, data)?;
    }
    Ok(())
}

pub fn run_stats(config: &CecConfig, output_mode: OutputMode) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if !store.has_schema()? {
        anyhow::bail!("{} has no schema; run `cecdb schema` first", config.database);
    }
    let stats = store.stats()?;

    if output_mode.is_human() {
        ui::header(&format!("{} {}", Icons::STATS, config.database));
        println!("{}", ui::stats_table(&stats));
    } else {
        emit_success(output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}

pub fn run_check(config: &CecConfig, output_mode: OutputMode) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if !store.foreign_keys_enabled()? {
        anyhow::bail!("foreign key enforcement is off for this connection");
    }
    let issues = store.foreign_key_check()?;

    if output_mode.is_human() {
        if issues.is_empty() {
            ui::success(&format!("{} No dangling references", Icons::LINK));
        } else {
            ui::error(&format!("{} dangling reference(s)", issues.len()));
            println!("{}", ui::foreign_key_table(&issues));
        }
    } else {
        emit_success(output_mode, "check", serde_json::json!({ "issues": issues }))?;
    }

    if !issues.is_empty() {
        anyhow::bail!("referential check failed");
    }
    Ok(())
}

/// Departments known to the scrapers, read from the configured departments CSV
fn known_departments(config: &CecConfig) -> anyhow::Result<Vec<KnownEntity>> {
    let path = config.source_paths().departments;
    if !path.exists() {
        ui::warn(&format!("{} not found; department matching is skipped", path.display()));
        return Ok(Vec::new());
    }
    let rows: Vec<SourceRow<DepartmentRow>> = ingest::read_file(EntityKind::Department, &path, true)?;
    let departments = Normalizer::new(config.unresolved).departments(&rows, &mut NormalizeReport::default())?;
    Ok(departments
        .iter()
        .map(|d| KnownEntity::new(&d.department_id, &d.department_name))
        .collect())
}

fn report_append(output_mode: OutputMode, command: &str, parsed: usize, sink: &Path, report: &AppendReport) -> anyhow::Result<()> {
    if output_mode.is_human() {
        ui::info("Entries parsed", &parsed.to_string());
        ui::info("Already present", &report.skipped_existing.to_string());
        if let (Some(first), Some(last)) = (report.appended.first(), report.appended.last()) {
            ui::info("Ids", &format!("{} to {}", first, last));
        }
        ui::success(&format!("{} {} row(s) appended to {}", Icons::FILE, report.appended.len(), sink.display()));
    } else {
        let mut data = serde_json::to_value(report)?;
        data["parsed"] = serde_json::json!(parsed);
        data["sink"] = serde_json::json!(sink.display().to_string());
        emit_success(output_mode, command, data)?;
    }
    Ok(())
}

pub fn run_scrape_faculty(
    config: &CecConfig,
    input: &Path,
    output: Option<&Path>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let sink = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.source_paths().faculty);

    let held = if config.database_path().exists() {
        held_faculty_ids(&open_store(config)?)?
    } else {
        Vec::new()
    };
    let departments = known_departments(config)?;
    let records = faculty::FacultyParser::new()?.parse_entries(&text, &departments);
    let report = faculty::append_faculty(&sink, &records, &config.faculty_id_prefix, &held)?;
    report_append(output_mode, "scrape-faculty", records.len(), &sink, &report)
}

pub fn run_scrape_grants(
    config: &CecConfig,
    input: &Path,
    output: Option<&Path>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let sink = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.source_paths().grants);

    let parser = grants::GrantParser::new()?;
    let parsed = parser.parse_entries(&text);
    let report = grants::append_grants(&sink, &parsed, &config.grant_id_prefix)?;
    report_append(output_mode, "scrape-grants", parsed.len(), &sink, &report)
}
