use crate::core::{DataError, Result};
use crate::executor::ExecutorKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub executor: ExecutorConfig,
    pub sqlite: SqliteConfig,
}

/// Executor selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,
}

/// SQLite data source settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: String,
    pub busy_timeout_ms: u64,
    /// Statements run once after opening, e.g. `"foreign_keys = ON"`
    pub pragmas: Vec<String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
            pragmas: vec!["foreign_keys = ON".to_string()],
        }
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = datarail::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// `<config dir>/datarail/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("datarail").join("config.toml"))
}

/// Loads the file at `default_config_path()` if it exists, defaults otherwise.
pub fn load_default_config() -> Result<RuntimeConfig> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        Some(_) => Ok(RuntimeConfig::default()),
        None => Err(DataError::Config("no configuration directory".to_string())),
    }
}
