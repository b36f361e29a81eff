use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::exclude::STORAGE_DIR_NAME;

/// current on-disk format of a snapshot store
pub const STORE_FORMAT_VERSION: u32 = 1;

/// engine configuration, usually read from a toml file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// directory whose files are checkpointed
    pub workspace: PathBuf,
    /// root under which every workspace gets its own storage directory
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    /// extra exclusion patterns, one per line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// how many checkpoints a listing returns when no limit is given
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl EngineConfig {
    /// config for a workspace with every other setting at its default
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            storage_root: default_storage_root(),
            rules_file: None,
            preview_lines: default_preview_lines(),
            preview_chars: default_preview_chars(),
            list_limit: default_list_limit(),
        }
    }

    pub fn with_storage_root(mut self, storage_root: impl Into<PathBuf>) -> Self {
        self.storage_root = storage_root.into();
        self
    }

    pub fn with_rules_file(mut self, rules_file: impl Into<PathBuf>) -> Self {
        self.rules_file = Some(rules_file.into());
        self
    }

    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// storage directory for one workspace identity
    pub fn storage_dir_for(&self, identity: &str) -> PathBuf {
        self.storage_root.join(identity)
    }
}

/// `$XDG_DATA_HOME/rewind` or the platform equivalent, `~/.rewind` otherwise
pub fn default_storage_root() -> PathBuf {
    if let Some(data) = dirs::data_local_dir() {
        return data.join("rewind");
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STORAGE_DIR_NAME)
}

fn default_preview_lines() -> usize {
    5
}

fn default_preview_chars() -> usize {
    200
}

fn default_list_limit() -> usize {
    50
}

/// per-store configuration stored in the store's config.toml
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub version: u32,
    /// canonical path of the tracked root
    pub workspace: PathBuf,
    /// identity the store is partitioned under
    pub identity: String,
}

impl StoreConfig {
    pub fn new(workspace: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            workspace: workspace.into(),
            identity: identity.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: StoreConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}
