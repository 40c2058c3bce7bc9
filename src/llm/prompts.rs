//! Prompt templates for every model call the pipeline makes.

use crate::llm::provider::{ModelRole, Prompt};

/// Diffs beyond this are cut before summarization.
const MAX_DIFF_CHARS: usize = 20_000;

/// Chat-template control tokens that must not reach a model verbatim.
const CONTROL_TOKENS: &[&str] = &[
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
    "<|system|>",
    "<|user|>",
    "<|assistant|>",
    "<|eot_id|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
];

/// Remove chat-template control tokens from user-controlled text.
pub fn sanitize_for_prompt(text: &str) -> String {
    let mut out = text.to_string();
    for token in CONTROL_TOKENS {
        if out.contains(token) {
            out = out.replace(token, "");
        }
    }
    out
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn file_summary(path: &str, code: &str, max_code_chars: usize) -> Prompt {
    let code = sanitize_for_prompt(truncate_chars(code, max_code_chars));
    Prompt::new(format!(
        "You are helping a new engineer get oriented in an unfamiliar codebase.\n\
         Explain the purpose of the file below and how it works: what it is for, \
         the main types and functions it defines, and how it connects to the rest \
         of the project.\n\
         Use at most 300 words.\n\n\
         File: {path}\n\
         ```\n{code}\n```"
    ))
    .system("You are a senior software engineer who writes concise technical summaries.")
}

pub fn commit_summary(message: &str, diff: &str) -> Prompt {
    let diff = sanitize_for_prompt(truncate_chars(diff, MAX_DIFF_CHARS));
    Prompt::new(format!(
        "Summarize the following git commit for a changelog.\n\
         Reply only with a short bullet list; start every bullet with `* ` and \
         mention the files that matter.\n\n\
         Commit message: {}\n\n\
         Diff:\n{diff}",
        sanitize_for_prompt(message)
    ))
}

pub fn classify_question(question: &str) -> Prompt {
    Prompt::new(format!(
        "Classify the question below about a software repository.\n\
         Answer \"broad\" if it asks about the project as a whole (purpose, \
         architecture, overview, setup). Answer \"specific\" if it asks about a \
         particular file, function, error or line.\n\
         Respond with exactly one word: broad or specific.\n\n\
         Question: {}",
        sanitize_for_prompt(question)
    ))
    .max_tokens(5)
    .temperature(0.0)
    .role(ModelRole::Fast)
}

pub fn answer(context: &str, question: &str) -> Prompt {
    Prompt::new(format!(
        "{context}---\nQuestion: {}",
        sanitize_for_prompt(question)
    ))
    .system(
        "You are a code assistant answering questions about one repository.\n\
         Each message includes the project file structure and the source and \
         summary of the most relevant files.\n\
         Answer only from that material. If it does not contain the answer, say \
         what you found and what is missing.\n\
         Reference file paths. Use markdown code blocks with language tags.",
    )
}
