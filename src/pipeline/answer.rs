use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};

use crate::error::Result;
use crate::llm::provider::{Prompt, ProviderChain, StreamingGenerator, TextGenerator};
use crate::models::{QuestionKind, RetrievalHit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChunk {
    /// Incremental text from the streaming provider
    Delta(String),
    /// Full answer from the completion fallback. Replaces any deltas
    /// already delivered.
    Complete(String),
}

pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerChunk>> + Send>>;

/// A streamed answer plus the files it was grounded on.
pub struct Answer {
    pub stream: AnswerStream,
    pub references: Vec<RetrievalHit>,
    pub kind: QuestionKind,
}

impl std::fmt::Debug for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answer")
            .field("references", &self.references.len())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Streams an answer, falling back once to a plain completion when the
/// stream cannot start, errors, or goes quiet.
#[derive(Clone)]
pub struct AnswerStreamer {
    streaming: ProviderChain<dyn StreamingGenerator>,
    completion: ProviderChain<dyn TextGenerator>,
    idle_timeout: Duration,
}

impl AnswerStreamer {
    pub fn new(
        streaming: ProviderChain<dyn StreamingGenerator>,
        completion: ProviderChain<dyn TextGenerator>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            streaming,
            completion,
            idle_timeout,
        }
    }

    /// Dropping the returned stream abandons the upstream request.
    pub fn stream(&self, prompt: Prompt) -> AnswerStream {
        let streaming = self.streaming.clone();
        let completion = self.completion.clone();
        let idle = self.idle_timeout;

        Box::pin(async_stream::stream! {
            let interrupted = match streaming.stream(&prompt).await {
                Ok(mut upstream) => loop {
                    match tokio::time::timeout(idle, upstream.next()).await {
                        Ok(Some(Ok(delta))) => {
                            if !delta.is_empty() {
                                yield Ok(AnswerChunk::Delta(delta));
                            }
                        }
                        Ok(Some(Err(e))) => break Some(e.to_string()),
                        Ok(None) => break None,
                        Err(_) => break Some(format!("no output for {}s", idle.as_secs_f32())),
                    }
                },
                Err(e) => Some(e.to_string()),
            };

            if let Some(reason) = interrupted {
                tracing::warn!("Answer stream interrupted ({reason}), retrying as a completion");
                match completion.complete(&prompt).await {
                    Ok(text) => yield Ok(AnswerChunk::Complete(text)),
                    Err(e) => {
                        tracing::error!("Answer fallback failed: {e}");
                        yield Err(e);
                    }
                }
            }
        })
    }
}
