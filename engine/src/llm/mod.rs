//! Optional LLM refinement of deterministic summaries
//!
//! A [`Refiner`] only ever improves a candidate the deterministic strategies
//! already produced. Absence, unavailability and failure all leave the
//! candidate in place; the optimizer never requires a provider.
//!
//! Wrappers compose around any refiner:
//! - [`CachedRefiner`] reuses results for identical inputs
//! - [`TimeoutRefiner`] bounds each call of a refiner that has no deadline
//!   of its own

#[cfg(feature = "llm")]
mod http;

#[cfg(feature = "llm")]
pub use http::HttpRefiner;

use crate::error::ConfigurationError;
use crate::types::LanguageTag;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// System prompt sent with every refinement request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a code summarization expert. Create concise, \
informative summaries of code that keep the most important information while significantly \
reducing size. Keep public API signatures, core logic, important data structures, key \
dependencies and critical error handling. Omit inferable implementation details, verbose \
comments, repetitive patterns and private helpers. Output valid code syntax and use '...' for \
omitted sections. Keep every import and export statement exactly as given.";

/// LLM provider failures; always absorbed by the optimizer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Known providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-3.5-turbo",
            Self::Anthropic => "claude-3-haiku-20240307",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }

    /// Environment variable holding the API key
    pub fn default_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(ConfigurationError::UnknownName { kind: "llm provider", value: s.to_owned() }),
        }
    }
}

/// Provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    /// Defaults to the provider's small model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Defaults to the provider's public API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Defaults to `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: None,
            endpoint: None,
            api_key_env: None,
            timeout_secs: 30,
            max_output_tokens: 500,
            temperature: 0.3,
            cache_capacity: 256,
            cache_ttl_secs: 3600,
        }
    }
}

impl LlmSettings {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(self.provider.default_endpoint())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or(self.provider.default_key_env())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// What the provider is told about the file being refined
#[derive(Debug, Clone, PartialEq)]
pub struct RefineHint {
    pub path: String,
    pub language: LanguageTag,
    pub importance: f64,
    pub target_ratio: f64,
}

impl RefineHint {
    /// Context block placed ahead of the content in a prompt
    pub fn context(&self) -> String {
        format!(
            "File: {}\nLanguage: {}\nImportance: {:.2}\nTarget compression: {}% of original",
            self.path,
            self.language,
            self.importance,
            (self.target_ratio * 100.0).round() as u64
        )
    }
}

/// An external summarizer used to refine deterministic candidates
pub trait Refiner: Send + Sync {
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Whether calls can be made at all (credentials present, client built)
    fn is_available(&self) -> bool;

    /// Produce a summary of `text` aiming for `target_tokens`
    fn refine(&self, text: &str, target_tokens: u64, hint: &RefineHint)
        -> Result<String, ProviderError>;
}

impl<R: Refiner + ?Sized> Refiner for Arc<R> {
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn refine(
        &self,
        text: &str,
        target_tokens: u64,
        hint: &RefineHint,
    ) -> Result<String, ProviderError> {
        (**self).refine(text, target_tokens, hint)
    }
}

type CacheKey = ([u8; 32], u64, String, String);

/// Reuses refinements for identical (content, target, provider, model)
pub struct CachedRefiner<R> {
    inner: R,
    cache: Cache<CacheKey, String>,
}

impl<R: Refiner> CachedRefiner<R> {
    pub fn new(inner: R, capacity: u64, ttl: Duration) -> Self {
        Self { inner, cache: Cache::builder().max_capacity(capacity).time_to_live(ttl).build() }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn key(&self, text: &str, target_tokens: u64) -> CacheKey {
        (
            *blake3::hash(text.as_bytes()).as_bytes(),
            target_tokens,
            self.inner.provider().to_owned(),
            self.inner.model().to_owned(),
        )
    }
}

impl<R: Refiner> Refiner for CachedRefiner<R> {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn refine(
        &self,
        text: &str,
        target_tokens: u64,
        hint: &RefineHint,
    ) -> Result<String, ProviderError> {
        let key = self.key(text, target_tokens);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("{}: refinement cache hit", hint.path);
            return Ok(hit);
        }
        let refined = self.inner.refine(text, target_tokens, hint)?;
        self.cache.insert(key, refined.clone());
        Ok(refined)
    }
}

/// Bounds every call of the wrapped refiner by a deadline.
///
/// The call runs on a helper thread. On timeout the caller gets
/// [`ProviderError::Timeout`] at once, but the thread keeps running until the
/// inner call returns and its result is discarded. Clients with their own
/// request timeout, like [`HttpRefiner`], are not wrapped.
pub struct TimeoutRefiner {
    inner: Arc<dyn Refiner>,
    timeout: Duration,
}

impl TimeoutRefiner {
    pub fn new(inner: Arc<dyn Refiner>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Refiner for TimeoutRefiner {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn refine(
        &self,
        text: &str,
        target_tokens: u64,
        hint: &RefineHint,
    ) -> Result<String, ProviderError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let text = text.to_owned();
        let hint = hint.clone();
        thread::Builder::new()
            .name("contextfit-refine".to_owned())
            .spawn(move || {
                let _ = tx.send(inner.refine(&text, target_tokens, &hint));
            })
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ProviderError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ProviderError::Transport("refinement worker exited".to_owned()))
            }
        }
    }
}

/// Build the configured provider client behind a cache
#[cfg(feature = "llm")]
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn Refiner>, ProviderError> {
    Ok(Arc::new(cached_client(settings)?))
}

/// The HTTP client enforces `settings.timeout()` per request
#[cfg(feature = "llm")]
pub(crate) fn cached_client(
    settings: &LlmSettings,
) -> Result<CachedRefiner<HttpRefiner>, ProviderError> {
    Ok(CachedRefiner::new(
        HttpRefiner::new(settings)?,
        settings.cache_capacity,
        Duration::from_secs(settings.cache_ttl_secs),
    ))
}

/// Remove a surrounding Markdown code fence from a model reply
pub(crate) fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let inner = &trimmed[..trimmed.len() - 3];
    match inner.find('\n') {
        Some(first_newline) => inner[first_newline + 1..].trim_end(),
        None => trimmed,
    }
}
