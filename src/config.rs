use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::ingest::SourcePaths;
use crate::normalize::UnresolvedPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CecConfig {
    pub database: String,
    pub data_dir: String,
    pub unresolved: UnresolvedPolicy,
    pub faculty_id_prefix: String,
    pub grant_id_prefix: String,
    pub sources: SourcesConfig,
}

impl Default for CecConfig {
    fn default() -> Self {
        Self {
            database: "cec.db".to_string(),
            data_dir: "data".to_string(),
            unresolved: UnresolvedPolicy::Abort,
            faculty_id_prefix: "F".to_string(),
            grant_id_prefix: "G".to_string(),
            sources: SourcesConfig::default(),
        }
    }
}

/// File names of each entity's CSV, relative to `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub departments: String,
    pub capabilities: String,
    pub capability_departments: String,
    pub faculty: String,
    pub grants: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            departments: "departments.csv".to_string(),
            capabilities: "capabilities.csv".to_string(),
            capability_departments: "capability_departments.csv".to_string(),
            faculty: "faculty.csv".to_string(),
            grants: "grants.csv".to_string(),
        }
    }
}

impl CecConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Resolve a configured source file name against the data directory
    pub fn source_path(&self, file: &str) -> PathBuf {
        self.data_dir().join(file)
    }

    pub fn source_paths(&self) -> SourcePaths {
        SourcePaths {
            departments: self.source_path(&self.sources.departments),
            capabilities: self.source_path(&self.sources.capabilities),
            capability_departments: self.source_path(&self.sources.capability_departments),
            faculty: self.source_path(&self.sources.faculty),
            grants: self.source_path(&self.sources.grants),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("cecdb.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<CecConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: CecConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &CecConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CecConfig = toml::from_str(
            r#"
            database = "out/cec.db"
            unresolved = "skip"

            [sources]
            grants = "grants_cec.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.database, "out/cec.db");
        assert_eq!(config.unresolved, UnresolvedPolicy::Skip);
        assert_eq!(config.faculty_id_prefix, "F");
        assert_eq!(config.sources.departments, "departments.csv");
        assert_eq!(config.source_paths().grants, PathBuf::from("data/grants_cec.csv"));
    }

    #[test]
    fn test_write_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cecdb.toml");
        write_config(&path, &CecConfig::default(), false).unwrap();
        assert!(write_config(&path, &CecConfig::default(), false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database, "cec.db");
        assert_eq!(loaded.unresolved, UnresolvedPolicy::Abort);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("cec.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
