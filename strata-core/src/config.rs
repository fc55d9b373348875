//! Configuration types

use crate::{ConfigError, KeyConvention};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file mapping logical database names to paths.
pub const DEFAULT_SETTINGS_PATH: &str = "settings/database.json";
/// Default logical database name.
pub const DEFAULT_DATABASE_NAME: &str = "database.db";
pub const DEFAULT_DEBOUNCE_MS: u64 = 3000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the SQLite file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseSource {
    /// Direct path, bypassing the settings file
    Path(PathBuf),
    /// Logical name looked up in a settings file
    Named { settings: PathBuf, name: String },
}

/// One entry of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub path: PathBuf,
}

/// Debounce settings for the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub debounce: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl DispatchConfig {
    pub fn with_debounce(debounce: Duration) -> Self {
        Self { debounce }
    }
}

/// Master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrataConfig {
    pub database: DatabaseSource,
    pub busy_timeout: Duration,
    pub convention: KeyConvention,
    pub dispatch: DispatchConfig,
}

impl StrataConfig {
    /// Configuration opening the given file with default settings.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseSource::Path(path.into()),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            convention: KeyConvention::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Load configuration from `STRATA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match lookup("STRATA_DATABASE_PATH").filter(|s| !s.is_empty()) {
            Some(path) => DatabaseSource::Path(PathBuf::from(path)),
            None => DatabaseSource::Named {
                settings: lookup("STRATA_SETTINGS")
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
                name: lookup("STRATA_DATABASE")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            },
        };

        let debounce_ms = parse_millis(&lookup, "STRATA_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;
        let busy_ms = parse_millis(&lookup, "STRATA_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;

        let defaults = KeyConvention::default();
        let convention = KeyConvention {
            registry_table: lookup("STRATA_REGISTRY_TABLE").unwrap_or(defaults.registry_table),
            owner_column: lookup("STRATA_OWNER_COLUMN").unwrap_or(defaults.owner_column),
            index_column: lookup("STRATA_INDEX_COLUMN").unwrap_or(defaults.index_column),
        };

        let config = Self {
            database,
            busy_timeout: Duration::from_millis(busy_ms),
            convention,
            dispatch: DispatchConfig::with_debounce(Duration::from_millis(debounce_ms)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.debounce.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.debounce".to_string(),
                value: "0".to_string(),
                reason: "debounce window must be positive".to_string(),
            });
        }
        if self.busy_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "busy_timeout".to_string(),
                value: "0".to_string(),
                reason: "busy timeout must be positive".to_string(),
            });
        }

        for (field, value) in [
            ("convention.registry_table", &self.convention.registry_table),
            ("convention.owner_column", &self.convention.owner_column),
            ("convention.index_column", &self.convention.index_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: field.to_string(),
                });
            }
        }
        if self.convention.owner_column == self.convention.index_column {
            return Err(ConfigError::InvalidValue {
                field: "convention.index_column".to_string(),
                value: self.convention.index_column.clone(),
                reason: "owner and index columns must differ".to_string(),
            });
        }

        match &self.database {
            DatabaseSource::Path(path) if path.as_os_str().is_empty() => {
                Err(ConfigError::MissingRequired {
                    field: "database.path".to_string(),
                })
            }
            DatabaseSource::Named { name, .. } if name.is_empty() => {
                Err(ConfigError::MissingRequired {
                    field: "database.name".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve the SQLite file path, reading the settings file if needed.
    ///
    /// Relative paths in the settings file are taken relative to the
    /// settings file's directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database {
            DatabaseSource::Path(path) => Ok(path.clone()),
            DatabaseSource::Named { settings, name } => {
                let entries = load_settings(settings)?;
                let entry = entries
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownDatabase {
                        name: name.clone(),
                        settings: settings.display().to_string(),
                    })?;
                if entry.path.is_absolute() {
                    Ok(entry.path.clone())
                } else {
                    let base = settings.parent().unwrap_or_else(|| Path::new(""));
                    Ok(base.join(&entry.path))
                }
            }
        }
    }
}

/// Read the settings file: logical name → `{ "path": … }`.
pub fn load_settings(path: &Path) -> Result<BTreeMap<String, DatabaseEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::InvalidValue {
        field: "settings".to_string(),
        value: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn parse_millis<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: "expected a whole number of milliseconds".to_string(),
        }),
    }
}
