use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::client::ModelClient;

/// Summaries are a few hundred words; anything longer is cut before
/// embedding so it stays inside small local models' context.
const MAX_EMBED_CHARS: usize = 8_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS` bytes on a char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Truncate or zero-pad a vector to the index width.
pub fn fit_dimension(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    vector.resize(dim, 0.0);
    vector
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

impl ModelClient {
    pub(crate) async fn embed_ollama(&self, text: &str) -> Result<Vec<f32>> {
        let req = OllamaEmbedRequest {
            model: &self.config.embedding_model,
            input: vec![truncate_for_embedding(text)],
            truncate: true,
        };

        let resp = self
            .http
            .post(self.url("/api/embed"))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to call Ollama embed API: {e}")))?;
        let resp = self.check("Ollama embed API", resp).await?;

        let body: OllamaEmbedResponse = resp
            .json()
            .await
            .map_err(|e| self.fail(format!("failed to parse Ollama embed response: {e}")))?;
        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| self.fail("no embedding returned"))
    }

    pub(crate) async fn embed_openai(&self, text: &str) -> Result<Vec<f32>> {
        let req = OpenAiEmbedRequest {
            model: &self.config.embedding_model,
            input: vec![truncate_for_embedding(text)],
        };

        let resp = self
            .authorize(self.http.post(self.url("/v1/embeddings")))
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to call embeddings API: {e}")))?;
        let resp = self.check("Embeddings API", resp).await?;

        let body: OpenAiEmbedResponse = resp
            .json()
            .await
            .map_err(|e| self.fail(format!("failed to parse embeddings response: {e}")))?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| self.fail("no embedding returned"))
    }
}
