//! Non-streaming chat completions.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::client::{wire_messages, ModelClient, WireMessage};
use crate::llm::provider::Prompt;

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct OllamaChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

#[derive(Serialize)]
pub(crate) struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl OllamaOptions {
    pub fn from_prompt(prompt: &Prompt) -> Option<Self> {
        if prompt.max_tokens.is_none() && prompt.temperature.is_none() {
            return None;
        }
        Some(Self {
            num_predict: prompt.max_tokens,
            temperature: prompt.temperature,
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: WireMessage,
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
pub(crate) struct OpenAiChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

impl ModelClient {
    pub(crate) async fn complete_ollama(&self, prompt: &Prompt) -> Result<String> {
        let req = OllamaChatRequest {
            model: self.model_for(prompt.role),
            messages: wire_messages(prompt),
            stream: false,
            options: OllamaOptions::from_prompt(prompt),
        };

        let resp = self
            .http
            .post(self.url("/api/chat"))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to call Ollama chat API: {e}")))?;
        let resp = self.check("Ollama chat API", resp).await?;

        let body: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| self.fail(format!("failed to parse Ollama chat response: {e}")))?;
        Ok(body.message.content)
    }

    pub(crate) async fn complete_openai(&self, prompt: &Prompt) -> Result<String> {
        let req = OpenAiChatRequest {
            model: self.model_for(prompt.role),
            messages: wire_messages(prompt),
            stream: false,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let resp = self
            .authorize(self.http.post(self.url("/v1/chat/completions")))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to call chat completions API: {e}")))?;
        let resp = self.check("Chat completions API", resp).await?;

        let body: OpenAiChatResponse = resp
            .json()
            .await
            .map_err(|e| self.fail(format!("failed to parse chat completion: {e}")))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
