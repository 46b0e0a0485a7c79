use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WorkerConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory the `wof-<layer>-data.json` side table is written into.
    pub side_table_dir: PathBuf,
    pub id_property: String,
    pub hierarchy_property: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            side_table_dir: PathBuf::from("."),
            id_property: "id".to_string(),
            hierarchy_property: "Hierarchy".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub premature_search: PrematureSearchPolicy,
    /// Emit `load-failed` instead of staying silent when a load aborts.
    pub report_load_failure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            premature_search: PrematureSearchPolicy::Queue,
            report_load_failure: true,
        }
    }
}

/// What to do with a `search` that arrives before the layer is ready.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrematureSearchPolicy {
    /// Hold it and answer once `loaded` has been sent.
    #[default]
    Queue,
    /// Answer straight away with an empty result.
    Reject,
}

impl WorkerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: WorkerConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}
