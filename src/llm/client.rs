use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::llm::provider::{
    Embedder, ModelRole, Prompt, Provider, StreamingGenerator, TextGenerator, TextStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ollama,
    /// OpenAI, OpenRouter, Groq or any other `/v1/chat/completions` API
    OpenAi,
}

impl Backend {
    pub fn parse(provider: &str) -> Result<Self> {
        match provider {
            "ollama" => Ok(Backend::Ollama),
            "openai" | "openrouter" | "groq" => Ok(Backend::OpenAi),
            other => Err(Error::provider(other, "unsupported LLM provider")),
        }
    }
}

/// HTTP client for one model backend, implementing every capability.
pub struct ModelClient {
    pub(crate) name: String,
    pub(crate) backend: Backend,
    pub(crate) http: reqwest::Client,
    pub(crate) config: ProviderConfig,
}

impl ModelClient {
    pub fn new(http: reqwest::Client, config: ProviderConfig) -> Result<Self> {
        let backend = Backend::parse(&config.provider)?;
        let host = config
            .base_url
            .split("://")
            .nth(1)
            .unwrap_or(&config.base_url)
            .trim_end_matches('/');
        Ok(Self {
            name: format!("{}@{host}", config.provider),
            backend,
            http,
            config,
        })
    }

    pub(crate) fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Chat => &self.config.chat_model,
            ModelRole::Fast => &self.config.fast_model,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub(crate) fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    pub(crate) fn fail(&self, message: impl std::fmt::Display) -> Error {
        Error::provider(self.name.clone(), message)
    }

    /// Turn a non-success response into a provider error carrying the body.
    pub(crate) async fn check(&self, api: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(self.fail(format!("{api} returned {status}: {body}")))
    }
}

/// Chat message in the shape both backends accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub role: String,
    pub content: String,
}

pub(crate) fn wire_messages(prompt: &Prompt) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &prompt.system {
        messages.push(WireMessage {
            role: "system".to_string(),
            content: system.clone(),
        });
    }
    messages.push(WireMessage {
        role: "user".to_string(),
        content: prompt.user.clone(),
    });
    messages
}

impl Provider for ModelClient {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TextGenerator for ModelClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let text = match self.backend {
            Backend::Ollama => self.complete_ollama(prompt).await?,
            Backend::OpenAi => self.complete_openai(prompt).await?,
        };
        if text.trim().is_empty() {
            return Err(self.fail("empty completion"));
        }
        Ok(text)
    }
}

#[async_trait]
impl StreamingGenerator for ModelClient {
    async fn stream(&self, prompt: &Prompt) -> Result<TextStream> {
        match self.backend {
            Backend::Ollama => self.stream_ollama(prompt).await,
            Backend::OpenAi => self.stream_openai(prompt).await,
        }
    }
}

#[async_trait]
impl Embedder for ModelClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = match self.backend {
            Backend::Ollama => self.embed_ollama(text).await?,
            Backend::OpenAi => self.embed_openai(text).await?,
        };
        if vector.is_empty() {
            return Err(self.fail("empty embedding"));
        }
        Ok(vector)
    }
}
