pub mod chat_stream;
pub mod client;
pub mod completion;
pub mod embeddings;
pub mod prompts;
pub mod provider;
pub mod summarize;

pub use client::ModelClient;
pub use provider::{
    Embedder, ModelRole, Prompt, Provider, ProviderChain, StreamingGenerator, TextGenerator,
    TextStream,
};
pub use summarize::Summarizer;
