//! Inventory configuration.
//!
//! Defaults, then an optional TOML file, then `STOCKLINE_*` environment
//! overrides. Every knob has a working default, so no file is required.
//!
//! ```toml
//! [database]
//! path = "/var/lib/stockline/stockline.db"
//! max_connections = 5
//!
//! [import]
//! max_rows = 1000
//! batch_size = 20
//! budget_secs = 25
//! detail_limit = 200
//!
//! [ledger]
//! retry_attempts = 3
//! ```

use config::{Config, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::pool::DbConfig;
use crate::service::import::ImportSettings;
use stockline_core::{
    DEFAULT_IMPORT_BATCH_SIZE, DEFAULT_IMPORT_BUDGET_SECS, DEFAULT_IMPORT_DETAIL_LIMIT,
    DEFAULT_RETRY_ATTEMPTS, MAX_IMPORT_ROWS,
};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InventoryConfig {
    pub database: DatabaseSection,
    pub import: ImportSection,
    pub ledger: LedgerSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file, or `:memory:`.
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: "stockline.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSection {
    pub max_rows: usize,
    pub batch_size: usize,
    /// Wall-clock budget per import run
    pub budget_secs: u64,
    pub detail_limit: usize,
}

impl Default for ImportSection {
    fn default() -> Self {
        ImportSection {
            max_rows: MAX_IMPORT_ROWS,
            batch_size: DEFAULT_IMPORT_BATCH_SIZE,
            budget_secs: DEFAULT_IMPORT_BUDGET_SECS,
            detail_limit: DEFAULT_IMPORT_DETAIL_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Attempts on VersionConflict for retrying callers
    pub retry_attempts: u32,
}

impl Default for LedgerSection {
    fn default() -> Self {
        LedgerSection {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl InventoryConfig {
    /// Loads configuration from `path` (if it exists) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&InventoryConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            debug!(path = %path.display(), "Reading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let mut config: InventoryConfig = builder.build()?.try_deserialize()?;
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from [`default_path`](Self::default_path) and the environment.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        Self::load(path.as_deref())
    }

    /// Platform config location, e.g. `~/.config/stockline/stockline.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "stockline", "inventory")
            .map(|dirs| dirs.config_dir().join("stockline.toml"))
    }

    /// Applies `STOCKLINE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STOCKLINE_DB_PATH") {
            self.database.path = path;
        }
        override_parsed(
            &lookup,
            "STOCKLINE_DB_MAX_CONNECTIONS",
            &mut self.database.max_connections,
        )?;
        override_parsed(&lookup, "STOCKLINE_IMPORT_MAX_ROWS", &mut self.import.max_rows)?;
        override_parsed(&lookup, "STOCKLINE_IMPORT_BATCH_SIZE", &mut self.import.batch_size)?;
        override_parsed(&lookup, "STOCKLINE_IMPORT_BUDGET_SECS", &mut self.import.budget_secs)?;
        override_parsed(&lookup, "STOCKLINE_IMPORT_DETAIL_LIMIT", &mut self.import.detail_limit)?;
        override_parsed(
            &lookup,
            "STOCKLINE_LEDGER_RETRY_ATTEMPTS",
            &mut self.ledger.retry_attempts,
        )?;
        Ok(())
    }

    /// Rejects values no service can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.import.max_rows == 0 || self.import.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "import.max_rows and import.batch_size must be at least 1".to_string(),
            ));
        }
        if self.import.budget_secs == 0 {
            return Err(ConfigError::Invalid("import.budget_secs must be at least 1".to_string()));
        }
        if self.ledger.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "ledger.retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        if self.database.path == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            max_rows: self.import.max_rows,
            batch_size: self.import.batch_size,
            budget: Duration::from_secs(self.import.budget_secs),
            detail_limit: self.import.detail_limit,
        }
    }
}

fn override_parsed<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    }
    Ok(())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = InventoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.import.batch_size, DEFAULT_IMPORT_BATCH_SIZE);
        assert_eq!(config.import_settings().budget, Duration::from_secs(25));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = InventoryConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.ledger.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[import]\nbatch_size = 50\nbudget_secs = 10\n\n[database]\npath = \":memory:\""
        )
        .unwrap();

        let config = InventoryConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.import.budget_secs, 10);
        assert_eq!(config.import.max_rows, MAX_IMPORT_ROWS);
        assert!(config.db_config().is_in_memory());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STOCKLINE_DB_PATH", "/tmp/other.db"),
            ("STOCKLINE_IMPORT_BATCH_SIZE", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = InventoryConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.path, "/tmp/other.db");
        assert_eq!(config.import.batch_size, 5);
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let mut config = InventoryConfig::default();
        let err = config
            .apply_overrides(|name| {
                (name == "STOCKLINE_LEDGER_RETRY_ATTEMPTS").then(|| "lots".to_string())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue(ref name) if name == "STOCKLINE_LEDGER_RETRY_ATTEMPTS"
        ));
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let mut config = InventoryConfig::default();
        config.import.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
