use std::sync::LazyLock;

use regex::Regex;

use crate::llm::prompts;
use crate::llm::provider::{ProviderChain, TextGenerator};
use crate::models::QuestionKind;

static BROAD_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)codebase|project|overview|about|summary|explain|architecture|docs")
        .expect("static regex")
});

static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"));

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));

/// High-level vocabulary check over the raw question.
pub fn heuristic_broad(question: &str) -> bool {
    BROAD_VOCABULARY.is_match(question)
}

/// Strip markup and reasoning blocks from a model reply, then lowercase.
/// Returns `None` when nothing usable is left.
pub fn normalize_answer(raw: &str) -> Option<String> {
    let without_reasoning = REASONING_BLOCK.replace_all(raw, "");
    let text = MARKUP_TAG.replace_all(&without_reasoning, "");
    let text = text.trim().to_lowercase();
    (!text.is_empty()).then_some(text)
}

/// Combine the model's answer with the heuristic. The heuristic can only
/// move a question towards broad; an explicit "specific" always stands.
pub fn decide(answer: Option<&str>, heuristic: bool) -> QuestionKind {
    let Some(answer) = answer.and_then(normalize_answer) else {
        return if heuristic {
            QuestionKind::Broad
        } else {
            QuestionKind::Specific
        };
    };

    if answer.contains("broad") {
        return QuestionKind::Broad;
    }
    let first_word = answer
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric());
    if first_word == "specific" || !heuristic {
        QuestionKind::Specific
    } else {
        QuestionKind::Broad
    }
}

/// Labels questions as broad or specific with a fast model call.
#[derive(Clone)]
pub struct QuestionClassifier {
    chain: ProviderChain<dyn TextGenerator>,
}

impl QuestionClassifier {
    pub fn new(chain: ProviderChain<dyn TextGenerator>) -> Self {
        Self { chain }
    }

    /// Never fails: a provider error counts as no answer.
    pub async fn classify(&self, question: &str) -> QuestionKind {
        let answer = match self.chain.complete(&prompts::classify_question(question)).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!("Question classification unavailable, using heuristic: {e}");
                None
            }
        };
        let kind = decide(answer.as_deref(), heuristic_broad(question));
        tracing::debug!("Classified question as {kind:?}");
        kind
    }
}
