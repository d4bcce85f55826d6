//! Path narration client

use super::embedding::network_error;
use super::{CollaboratorConfig, CollaboratorError, CollaboratorResult, LLMProvider, PathNarrator, PathTriple};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You explain relationships in a marketing intelligence graph. \
Given a chain of (entity, relationship, entity) steps, write two or three plain sentences \
describing how the first entity connects to the last. Do not invent facts.";

/// Render path triples as the user prompt
pub fn build_prompt(triples: &[PathTriple]) -> String {
    let mut prompt = String::from("Path:\n");
    for (i, t) in triples.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} -[{}]-> {}\n",
            i + 1,
            t.source_label,
            t.edge_type,
            t.target_label
        ));
    }
    prompt.push_str("\nExplain this connection.");
    prompt
}

pub struct NarratorClient {
    client: Client,
    config: CollaboratorConfig,
    api_base_url: String,
}

impl NarratorClient {
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

    async fn openai_chat(&self, prompt: &str) -> CollaboratorResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: String,
        }

        let api_key = self.config.require_api_key()?;
        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model: &self.config.model,
                messages: vec![
                    Message { role: "system", content: SYSTEM_PROMPT },
                    Message { role: "user", content: prompt },
                ],
                temperature: 0.2,
            })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            return Err(CollaboratorError::Api(format!("OpenAI error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::Api("OpenAI returned no choices".to_string()))
    }

    async fn ollama_chat(&self, prompt: &str) -> CollaboratorResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            system: &'a str,
            stream: bool,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                prompt,
                system: SYSTEM_PROMPT,
                stream: false,
            })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            return Err(CollaboratorError::Api(format!("Ollama error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        Ok(result.response)
    }

    async fn gemini_chat(&self, prompt: &str) -> CollaboratorResult<String> {
        #[derive(Serialize)]
        struct Request {
            contents: Vec<Content>,
        }

        #[derive(Serialize, Deserialize)]
        struct Content {
            role: Option<String>,
            parts: Vec<Part>,
        }

        #[derive(Serialize, Deserialize)]
        struct Part {
            text: String,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }

        let api_key = self.config.require_api_key()?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: format!("{}\n\n{}", SYSTEM_PROMPT, prompt) }],
                }],
            })
            .send()
            .await
            .map_err(network_error)?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("Gemini error: {}", text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Serialization(e.to_string()))?;
        result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| CollaboratorError::Api("Gemini returned no candidates".to_string()))
    }
}

#[async_trait]
impl PathNarrator for NarratorClient {
    async fn explain(&self, triples: &[PathTriple]) -> CollaboratorResult<String> {
        let prompt = build_prompt(triples);
        let text = match self.config.provider {
            LLMProvider::OpenAI => self.openai_chat(&prompt).await?,
            LLMProvider::Ollama => self.ollama_chat(&prompt).await?,
            LLMProvider::Gemini => self.gemini_chat(&prompt).await?,
        };
        Ok(text.trim().to_string())
    }
}
