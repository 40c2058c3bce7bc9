//! # repo-qa
//!
//! Ingests a GitHub repository into a per-project vector index and answers
//! natural-language questions about it with retrieval-augmented generation.
//!
//! ## Architecture
//!
//! ```text
//!   GitHub URL ──► RepositoryReference ──► Acquirer ──────────────┐
//!                                          │ probe size (public)  │
//!                                          │ tree count (token)   │
//!                                          ▼                      │
//!                                    zip archive ──► FileFilter   │
//!                                                        │        │
//!                                                        ▼        │
//!                                   EmbeddingGenerator (≤3 at once)
//!                                   summarize ──► embed summary ──► VectorIndex
//!
//!   Question ──┬──► QuestionClassifier (fast model + heuristic)
//!              └──► embed question
//!                        │
//!                        ▼
//!              ContextAssembler: search, anchors, fallback files
//!                        │
//!                        ▼
//!              AnswerStreamer: deltas, or one complete fallback
//!
//!   Poll ──► CommitPoller: list, skip known, diff, summarize ──► CommitStore
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, GitHub, models and retrieval
//! - [`error`] - Error taxonomy and the failure reasons shown on projects
//! - [`models`] - Shared data types: `RepositoryReference`, `Project`, `FileEmbedding`, `CommitRecord`
//! - [`github`] - Rate-limited GitHub client, archive acquisition and file filtering
//! - [`llm`] - Capability traits, provider fallback chains and the Ollama/OpenAI client
//! - [`store`] - Vector index and commit store with JSON persistence
//! - [`search`] - Question classification and context assembly
//! - [`pipeline`] - Ingest, ask and commit polling built from the pieces above
//! - [`api`] - Axum HTTP handlers for projects, questions (SSE) and commits
//! - [`state`] - Shared application state wiring clients, stores and the pipeline

pub mod api;
pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod state;
pub mod store;
