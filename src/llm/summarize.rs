use crate::error::Result;
use crate::llm::prompts;
use crate::llm::provider::{ProviderChain, TextGenerator};

/// Summaries of files and commits over a text-generation chain.
#[derive(Clone)]
pub struct Summarizer {
    chain: ProviderChain<dyn TextGenerator>,
    max_code_chars: usize,
}

impl Summarizer {
    pub fn new(chain: ProviderChain<dyn TextGenerator>, max_code_chars: usize) -> Self {
        Self {
            chain,
            max_code_chars,
        }
    }

    pub async fn summarize_file(&self, path: &str, code: &str) -> Result<String> {
        let prompt = prompts::file_summary(path, code, self.max_code_chars);
        let summary = self.chain.complete(&prompt).await?;
        Ok(summary.trim().to_string())
    }

    pub async fn summarize_diff(&self, message: &str, diff: &str) -> Result<String> {
        let prompt = prompts::commit_summary(message, diff);
        let summary = self.chain.complete(&prompt).await?;
        Ok(summary.trim().to_string())
    }
}
