//! Embedding client for the supported LLM providers

use super::{CollaboratorConfig, CollaboratorError, CollaboratorResult, Embedder, LLMProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generates embeddings through a provider's HTTP API
pub struct EmbeddingClient {
    client: Client,
    config: CollaboratorConfig,
    api_base_url: String,
}

impl EmbeddingClient {
    pub fn new(config: &CollaboratorConfig, timeout: Duration) -> CollaboratorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.base_url(),
            config: config.clone(),
        })
    }

    async fn openai_embedding(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            input: &'a str,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            data: Vec<Data>,
        }

        #[derive(Deserialize)]
        struct Data {
            embedding: Vec<f32>,
        }

        let api_key = self.config.require_api_key()?;
        let url = format!("{}/embeddings", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request { input: text, model: &self.config.model })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("OpenAI returned error: {}", error_text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CollaboratorError::Api("OpenAI returned no embedding".to_string()))
    }

    async fn ollama_embedding(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request { model: &self.config.model, prompt: text })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("Ollama returned error: {}", error_text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        Ok(result.embedding)
    }

    async fn gemini_embedding(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: String,
            content: Content<'a>,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            embedding: Values,
        }

        #[derive(Deserialize)]
        struct Values {
            values: Vec<f32>,
        }

        let api_key = self.config.require_api_key()?;
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.api_base_url, self.config.model, api_key
        );
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: format!("models/{}", self.config.model),
                content: Content { parts: vec![Part { text }] },
            })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("Gemini returned error: {}", error_text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        Ok(result.embedding.values)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn provider(&self) -> LLMProvider {
        self.config.provider
    }

    async fn embed(&self, text: &str) -> CollaboratorResult<Vec<f32>> {
        let vector = match self.config.provider {
            LLMProvider::OpenAI => self.openai_embedding(text).await?,
            LLMProvider::Ollama => self.ollama_embedding(text).await?,
            LLMProvider::Gemini => self.gemini_embedding(text).await?,
        };
        if vector.is_empty() {
            return Err(CollaboratorError::Api("empty embedding".to_string()));
        }
        Ok(vector)
    }
}

pub(super) fn network_error(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Network(e.to_string())
}
