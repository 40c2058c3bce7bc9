use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::llm::client::{wire_messages, ModelClient, WireMessage};
use crate::llm::completion::{OllamaChatRequest, OllamaOptions, OpenAiChatRequest};
use crate::llm::provider::{Prompt, TextStream};

const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

impl ModelClient {
    pub(crate) async fn stream_ollama(&self, prompt: &Prompt) -> Result<TextStream> {
        let req = OllamaChatRequest {
            model: self.model_for(prompt.role),
            messages: wire_messages(prompt),
            stream: true,
            options: OllamaOptions::from_prompt(prompt),
        };

        let resp = self
            .http
            .post(self.url("/api/chat"))
            .timeout(STREAM_TIMEOUT)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to connect for chat streaming: {e}")))?;
        let resp = self.check("Ollama chat API", resp).await?;

        let name = self.name.clone();
        let stream = split_lines(resp.bytes_stream()).filter_map(move |line| {
            let name = name.clone();
            async move {
                match line {
                    Ok(line) => parse_ollama_line(&line)
                        .map(|r| r.map_err(|msg| Error::provider(name, msg))),
                    Err(e) => Some(Err(Error::provider(name, e))),
                }
            }
        });
        Ok(Box::pin(stream))
    }

    pub(crate) async fn stream_openai(&self, prompt: &Prompt) -> Result<TextStream> {
        let req = OpenAiChatRequest {
            model: self.model_for(prompt.role),
            messages: wire_messages(prompt),
            stream: true,
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let resp = self
            .authorize(self.http.post(self.url("/v1/chat/completions")))
            .timeout(STREAM_TIMEOUT)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.fail(format!("failed to connect for chat streaming: {e}")))?;
        let resp = self.check("Chat completions API", resp).await?;

        let name = self.name.clone();
        let stream = split_lines(resp.bytes_stream()).filter_map(move |line| {
            let name = name.clone();
            async move {
                match line {
                    Ok(line) => parse_openai_line(&line)
                        .map(|r| r.map_err(|msg| Error::provider(name, msg))),
                    Err(e) => Some(Err(Error::provider(name, e))),
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

// ─── Line parsing ────────────────────────────────────────

#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// One NDJSON line from Ollama. `None` means nothing to forward.
fn parse_ollama_line(line: &str) -> Option<std::result::Result<String, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let chunk: OllamaStreamChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(format!("malformed stream chunk: {e}"))),
    };
    if let Some(error) = chunk.error {
        return Some(Err(error));
    }
    if chunk.done {
        return None;
    }
    chunk
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty())
        .map(Ok)
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiStreamError>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamError {
    message: String,
}

/// One server-sent-events line. Comments, other fields and `[DONE]` are
/// skipped.
fn parse_openai_line(line: &str) -> Option<std::result::Result<String, String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(format!("malformed stream chunk: {e}"))),
    };
    if let Some(error) = chunk.error {
        return Some(Err(error.message));
    }
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map(Ok)
}

// ─── Line buffering ──────────────────────────────────────

/// Split a byte stream into lines. Bytes are buffered until a newline so a
/// multi-byte character split across network chunks decodes intact.
fn split_lines<S, E>(byte_stream: S) -> impl Stream<Item = std::result::Result<String, String>> + Send
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new(), false),
        |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let rest = buffer.split_off(pos + 1);
                    let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                    buffer = rest;
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (stream, buffer, finished)));
                }
                if finished {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&buffer).trim().to_string();
                    return Some((Ok(line), (stream, Vec::new(), true)));
                }
                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            Err(format!("stream read error: {e}")),
                            (stream, Vec::new(), true),
                        ));
                    }
                    None => finished = true,
                }
            }
        },
    )
}
