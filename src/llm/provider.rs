//! Model capabilities and the ordered fallback chain over them.
//!
//! Each capability is its own trait so a backend can support a subset
//! (a local embedding server, a completion-only API). A [`ProviderChain`]
//! tries its providers in order and returns the first success.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::Stream;

use crate::error::{Error, Result};

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Which model a prompt should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Summaries and answers
    Chat,
    /// One-word classification
    Fast,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub role: ModelRole,
}

impl Prompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            max_tokens: None,
            temperature: None,
            role: ModelRole::Chat,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn role(mut self, role: ModelRole) -> Self {
        self.role = role;
        self
    }
}

pub trait Provider: Send + Sync {
    /// Label used in logs and chain failure messages.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait TextGenerator: Provider {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

#[async_trait]
pub trait StreamingGenerator: Provider {
    /// Resolves once the stream is established; deltas follow.
    async fn stream(&self, prompt: &Prompt) -> Result<TextStream>;
}

#[async_trait]
pub trait Embedder: Provider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Providers of one capability, tried in order.
pub struct ProviderChain<P: ?Sized> {
    capability: &'static str,
    providers: Vec<Arc<P>>,
}

impl<P: ?Sized> Clone for ProviderChain<P> {
    fn clone(&self) -> Self {
        Self {
            capability: self.capability,
            providers: self.providers.clone(),
        }
    }
}

impl<P: Provider + ?Sized> ProviderChain<P> {
    pub fn new(capability: &'static str, providers: Vec<Arc<P>>) -> Self {
        Self {
            capability,
            providers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Run `op` against each provider until one succeeds.
    pub async fn first_success<'a, T, F, Fut>(&'a self, mut op: F) -> Result<T>
    where
        F: FnMut(&'a P) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = Vec::new();
        for (i, provider) in self.providers.iter().enumerate() {
            match op(provider.as_ref()).await {
                Ok(value) => {
                    if i > 0 {
                        tracing::info!(
                            "{} served by fallback provider {}",
                            self.capability,
                            provider.name()
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("{} via {} failed: {e}", self.capability, provider.name());
                    attempts.push(format!("{}: {e}", provider.name()));
                }
            }
        }
        Err(Error::ProviderFailure {
            capability: self.capability,
            attempts,
        })
    }
}

impl ProviderChain<dyn TextGenerator> {
    pub async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.first_success(|p| p.complete(prompt)).await
    }
}

impl ProviderChain<dyn StreamingGenerator> {
    pub async fn stream(&self, prompt: &Prompt) -> Result<TextStream> {
        self.first_success(|p| p.stream(prompt)).await
    }
}

impl ProviderChain<dyn Embedder> {
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.first_success(|p| p.embed(text)).await
    }
}
