//! External LLM collaborators
//!
//! Two capabilities are consumed: text embedding (node/edge refresh and
//! search queries) and path narration. Every call carries a timeout and
//! returns a typed error; callers degrade instead of failing.

pub mod embedding;
pub mod narrator;

pub use embedding::EmbeddingClient;
pub use narrator::NarratorClient;

use crate::graph::EdgeType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),

    /// API error from LLM provider
    #[error("LLM API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// LLM provider options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LLMProvider {
    OpenAI,
    Ollama,
    Gemini,
}

impl LLMProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "https://api.openai.com/v1",
            LLMProvider::Ollama => "http://localhost:11434",
            LLMProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

/// Connection settings for one collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    pub provider: LLMProvider,
    /// Model name (e.g., "text-embedding-3-small", "llama3")
    pub model: String,
    /// API key; may be filled from the environment
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl CollaboratorConfig {
    pub fn base_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    pub(crate) fn require_api_key(&self) -> CollaboratorResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| CollaboratorError::Config(format!("{:?} requires API key", self.provider)))
    }
}

/// One hop of a path, as handed to the narrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTriple {
    pub source_label: String,
    pub edge_type: EdgeType,
    pub target_label: String,
}

/// Produces dense vectors from text
#[async_trait]
pub trait Embedder: Send + Sync {
    fn provider(&self) -> LLMProvider;

    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>>;
}

/// Produces a natural-language account of a path
#[async_trait]
pub trait PathNarrator: Send + Sync {
    async fn explain(&self, triples: &[PathTriple]) -> CollaboratorResult<String>;
}

/// Collaborators wired into the engine; either may be absent
#[derive(Clone, Default)]
pub struct Collaborators {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub narrator: Option<Arc<dyn PathNarrator>>,
}

impl Collaborators {
    /// HTTP clients for whichever collaborators are configured
    pub fn from_config(
        embedding: Option<&CollaboratorConfig>,
        narrator: Option<&CollaboratorConfig>,
        timeout: Duration,
    ) -> CollaboratorResult<Self> {
        let embedder = match embedding {
            Some(config) => Some(Arc::new(EmbeddingClient::new(config, timeout)?) as Arc<dyn Embedder>),
            None => None,
        };
        let narrator = match narrator {
            Some(config) => Some(Arc::new(NarratorClient::new(config, timeout)?) as Arc<dyn PathNarrator>),
            None => None,
        };
        Ok(Collaborators { embedder, narrator })
    }
}

/// Run a collaborator call, giving up after `limit`
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}
