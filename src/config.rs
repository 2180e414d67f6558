//! Store configuration: optional TOML file, then environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// How long a dead generation's rows are kept before a sweep may delete them.
    pub retention_secs: u64,
    pub default_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_secs: DEFAULT_RETENTION_SECS,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl StoreConfig {
    /// Load `path` if given, else defaults, then apply `CATALOG_DB` and
    /// `CATALOG_RETENTION_SECS` from the environment (or a `.env` file).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_toml(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };

        if let Ok(db) = dotenvy::var("CATALOG_DB") {
            config.db_path = PathBuf::from(db);
        }
        if let Ok(secs) = dotenvy::var("CATALOG_RETENTION_SECS") {
            config.retention_secs = secs
                .parse()
                .with_context(|| format!("CATALOG_RETENTION_SECS is not a number: {secs}"))?;
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "catalog-search", "catalog-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_db_path() -> PathBuf {
    default_data_dir().join("catalog.db")
}
