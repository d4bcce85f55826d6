//! Engine configuration
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `INTELGRAPH_DATA_PATH` | `data_path` |
//! | `INTELGRAPH_MAX_DEPTH` | `max_traversal_depth` |
//! | `INTELGRAPH_COLLABORATOR_TIMEOUT_MS` | `collaborator_timeout_ms` |
//! | `INTELGRAPH_LLM_API_KEY` | missing collaborator `api_key`s |

use crate::analytics::AnalyticsConfig;
use crate::llm::CollaboratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Hard ceiling for `max_traversal_depth`
pub const MAX_DEPTH_CEILING: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// RocksDB directory; `None` keeps everything in memory
    pub data_path: Option<PathBuf>,
    pub max_traversal_depth: usize,
    pub collaborator_timeout_ms: u64,
    pub embedding_staleness_secs: u64,
    /// Above this many embeddings per tenant, search uses the HNSW index
    pub exact_search_threshold: usize,
    /// ANN candidates fetched per requested hit
    pub ann_oversample: usize,
    /// Snapshots kept per tenant; `None` keeps all
    pub snapshot_retention: Option<usize>,
    pub analytics: AnalyticsConfig,
    pub embedding: Option<CollaboratorConfig>,
    pub narrator: Option<CollaboratorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_path: None,
            max_traversal_depth: 10,
            collaborator_timeout_ms: 5_000,
            embedding_staleness_secs: 30 * 24 * 60 * 60,
            exact_search_threshold: 2048,
            ann_oversample: 4,
            snapshot_retention: None,
            analytics: AnalyticsConfig::default(),
            embedding: None,
            narrator: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Apply `INTELGRAPH_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(path) = var("INTELGRAPH_DATA_PATH") {
            self.data_path = Some(PathBuf::from(path));
        }
        if let Some(depth) = var("INTELGRAPH_MAX_DEPTH") {
            self.max_traversal_depth = parse_var("INTELGRAPH_MAX_DEPTH", &depth)?;
        }
        if let Some(timeout) = var("INTELGRAPH_COLLABORATOR_TIMEOUT_MS") {
            self.collaborator_timeout_ms = parse_var("INTELGRAPH_COLLABORATOR_TIMEOUT_MS", &timeout)?;
        }
        if let Some(key) = var("INTELGRAPH_LLM_API_KEY") {
            for collaborator in [self.embedding.as_mut(), self.narrator.as_mut()].into_iter().flatten() {
                if collaborator.api_key.is_none() {
                    collaborator.api_key = Some(key.clone());
                }
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_traversal_depth == 0 || self.max_traversal_depth > MAX_DEPTH_CEILING {
            return Err(ConfigError::Invalid(format!(
                "max_traversal_depth must be in 1..={}, got {}",
                MAX_DEPTH_CEILING, self.max_traversal_depth
            )));
        }
        let damping = self.analytics.damping_factor;
        if !(damping > 0.0 && damping < 1.0) {
            return Err(ConfigError::Invalid(format!("damping_factor must be in (0, 1), got {}", damping)));
        }
        if self.analytics.iterations == 0 {
            return Err(ConfigError::Invalid("analytics iterations must be > 0".to_string()));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(ConfigError::Invalid("collaborator_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn embedding_staleness(&self) -> chrono::Duration {
        // chrono caps durations at i64::MAX milliseconds
        let secs = i64::try_from(self.embedding_staleness_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
        chrono::Duration::seconds(secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name,
        reason: e.to_string(),
    })
}
