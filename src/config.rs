//! YAML configuration: store location, bind address, media mounts and dataset registrations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::data::crossref::{MediaSettings, DEFAULT_MEDIA_PREFIX};
use crate::data::model::{Dataset, DEFAULT_ID_COLUMN};
use crate::store::{Store, StoreError};

pub const DEFAULT_CONFIG_PATH: &str = "voicetable.yaml";
pub const DEFAULT_DATA_DIR: &str = "data/store";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("dataset slug '{0}' is configured more than once")]
    DuplicateSlug(String),
    #[error("dataset slug must not be empty")]
    EmptySlug,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind: String,
    pub media_prefix: String,
    /// Language -> directory published under `<media_prefix>/<language>/`.
    pub media_roots: BTreeMap<String, PathBuf>,
    pub datasets: Vec<DatasetConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind: DEFAULT_BIND.to_string(),
            media_prefix: DEFAULT_MEDIA_PREFIX.to_string(),
            media_roots: BTreeMap::new(),
            datasets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetConfig {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub key_column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub audio_roots: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub members: BTreeSet<String>,
}

impl Config {
    /// Load from `$VOICETABLE_CONFIG` (or `voicetable.yaml`), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("VOICETABLE_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_path(Path::new(&path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for ds in &self.datasets {
            if ds.slug.trim().is_empty() {
                return Err(ConfigError::EmptySlug);
            }
            if !seen.insert(ds.slug.as_str()) {
                return Err(ConfigError::DuplicateSlug(ds.slug.clone()));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("VOICETABLE_BIND") {
            self.bind = bind;
        }
        if let Ok(dir) = std::env::var("VOICETABLE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn media(&self) -> MediaSettings {
        MediaSettings::new(self.media_prefix.clone())
    }
}

/// Upsert every configured dataset by slug. Existing ids, column order, rows and assets are kept.
pub fn sync_datasets(store: &dyn Store, config: &Config) -> Result<Vec<Dataset>, StoreError> {
    let mut synced = Vec::with_capacity(config.datasets.len());
    for cfg in &config.datasets {
        let mut dataset = match store.dataset_by_slug(&cfg.slug)? {
            Some(existing) => existing,
            None => {
                tracing::info!(dataset = %cfg.slug, "registering dataset");
                Dataset::new(cfg.slug.clone(), cfg.slug.clone())
            }
        };
        dataset.name = cfg.name.clone().unwrap_or_else(|| cfg.slug.clone());
        dataset.source_path = cfg.source_path.clone();
        dataset.key_column = cfg.key_column.clone().filter(|c| !c.trim().is_empty());
        dataset.id_column = cfg
            .id_column
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string());
        dataset.audio_roots = cfg.audio_roots.clone();
        dataset.members = cfg.members.clone();
        store.save_dataset(dataset.clone())?;
        synced.push(dataset);
    }
    Ok(synced)
}
