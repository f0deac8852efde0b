// Configuration file and environment overrides

use crate::filter::{DEFAULT_PAGE_LIMIT, SortKey};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_FILE: &str = "TODO_FILE";
pub const ENV_BACKEND: &str = "TODO_BACKEND";

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Json,
    Sqlite,
}

impl BackendKind {
    fn default_file(&self) -> &'static str {
        match self {
            BackendKind::Json => "tasks.json",
            BackendKind::Sqlite => "tasks.db",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(eyre!("Unknown backend '{}' (expected json or sqlite)", other)),
        }
    }
}

/// Settings read from `config.yaml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task file; relative paths resolve against the working directory
    pub data_file: Option<PathBuf>,
    pub backend: BackendKind,
    pub default_sort: String,
    pub default_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: None,
            backend: BackendKind::default(),
            default_sort: SortKey::default().to_string(),
            default_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Config {
    /// `~/.config/todostore/config.yaml` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("todostore").join("config.yaml"))
    }

    /// Load configuration, then apply environment overrides.
    ///
    /// An explicit path must exist; the default path may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = ?path, "Loading config");
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.sort_key()?;
        Ok(config)
    }

    /// Apply `TODO_FILE` / `TODO_BACKEND` through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(file) = lookup(ENV_FILE).filter(|v| !v.is_empty()) {
            self.data_file = Some(PathBuf::from(file));
        }
        if let Some(backend) = lookup(ENV_BACKEND).filter(|v| !v.is_empty()) {
            self.backend = backend.parse().with_context(|| format!("Invalid {}", ENV_BACKEND))?;
        }
        Ok(())
    }

    pub fn sort_key(&self) -> Result<SortKey> {
        self.default_sort
            .parse()
            .map_err(|e| eyre!("default_sort: {}", e))
    }

    /// Task file to use, falling back to the backend's default name
    pub fn data_file(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.backend.default_file()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Json);
        assert_eq!(config.data_file(), PathBuf::from("tasks.json"));
        assert_eq!(config.sort_key().unwrap(), SortKey::Id);
        assert_eq!(config.default_limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml("backend: sqlite\ndefault_sort: priority\n").unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.data_file(), PathBuf::from("tasks.db"));
        assert_eq!(config.sort_key().unwrap(), SortKey::Priority);
    }

    #[test]
    fn test_invalid_sort_rejected() {
        assert!(Config::from_yaml("default_sort: colour\n").is_err());
        assert!(Config::from_yaml("backend: postgres\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [(ENV_FILE, "/tmp/mine.db"), (ENV_BACKEND, "sqlite")].into();
        let mut config = Config::default();

        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.data_file(), PathBuf::from("/tmp/mine.db"));
    }

    #[test]
    fn test_bad_env_backend() {
        let mut config = Config::default();
        assert!(config.apply_env(|key| (key == ENV_BACKEND).then(|| "csv".to_string())).is_err());
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let temp = TempDir::new().unwrap();
        assert!(Config::from_file(&temp.path().join("missing.yaml")).is_err());

        let path = temp.path().join("config.yaml");
        fs::write(&path, "data_file: work.json\ndefault_limit: 20\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_file(), PathBuf::from("work.json"));
        assert_eq!(config.default_limit, 20);
    }
}
