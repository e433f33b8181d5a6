use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::index::IndexPaths;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub memory: MemoryConfig,
    pub advisory: AdvisoryConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub index_file: String,
    pub texts_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub dimension: usize,
    pub batch_size: usize,
    pub save_interval_secs: u64,
    pub queue_capacity: usize,
    pub force_save_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_incident_nodes: usize,
    pub max_outcome_nodes: usize,
    pub cache_size: usize,
    /// Candidates below this similarity are dropped from search results.
    pub similarity_threshold: f64,
    /// How many nearest vectors one search pulls before filtering and caching.
    pub search_candidates: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub base_confidence: f64,
    pub similar_incidents_k: usize,
    pub retrieval_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// TOML file of `[[policy]]` tables. Built-in policies are used when unset.
    pub policies_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.vigil".into(),
            index_file: "incident_vectors.index".into(),
            texts_file: "incident_texts.json".into(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: crate::embedding::EMBEDDING_DIM,
            batch_size: 16,
            save_interval_secs: 30,
            queue_capacity: 1024,
            force_save_timeout_secs: 10,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_incident_nodes: 1000,
            max_outcome_nodes: 5000,
            cache_size: 100,
            similarity_threshold: 0.3,
            search_candidates: 10,
        }
    }
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            base_confidence: 0.85,
            similar_incidents_k: 3,
            retrieval_timeout_ms: 2000,
        }
    }
}

impl AdvisoryConfig {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

/// Returns `~/.vigil/`, or `./.vigil` when no home directory can be determined.
pub fn default_vigil_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

/// Returns the default config file path: `~/.vigil/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vigil_dir().join("config.toml")
}

impl VigilConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VigilConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (VIGIL_DATA_DIR, VIGIL_LOG_LEVEL, VIGIL_POLICIES).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIGIL_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("VIGIL_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("VIGIL_POLICIES") {
            self.policy.policies_file = Some(val);
        }
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    pub fn index_paths(&self) -> IndexPaths {
        let dir = self.resolved_data_dir();
        IndexPaths::new(
            dir.join(&self.storage.index_file),
            dir.join(&self.storage.texts_file),
        )
    }

    pub fn resolved_policies_file(&self) -> Option<PathBuf> {
        self.policy.policies_file.as_deref().map(expand_tilde)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
