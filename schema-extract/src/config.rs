//! Client configuration and credential resolution.

use std::fmt;
use std::time::Duration;

use extract_core::extraction::ExtractionConfig;
use extract_core::prompt::{
    ExtractionMode, PromptBuilder, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL,
};
use openai_adapter::{OpenAiConfig, DEFAULT_BASE_URL};

use crate::errors::Error;

/// Environment variables consulted for the credential, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["OPENAI_API_KEY", "OPENAI_KEY"];

/// An opaque backend credential.
///
/// Its `Debug` output is redacted and it has no `Display`, so it cannot end
/// up in a log line by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a credential string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The secret, for handing to the HTTP client.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Resolves the credential: explicit value, then `OPENAI_API_KEY`, then `OPENAI_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingApiKey` when none of them is set and non-empty.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, Error> {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingApiKey` when no candidate is set and non-empty.
    pub fn resolve_with<F>(explicit: Option<&str>, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        explicit
            .map(str::to_string)
            .into_iter()
            .chain(API_KEY_ENV_VARS.iter().filter_map(|name| lookup(name)))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .map(Self)
            .ok_or(Error::MissingApiKey)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Configuration shared by every run a client performs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend API root.
    pub base_url: String,

    /// Model identifier.
    ///
    /// Default: `gpt-4o-mini`
    pub model: String,

    /// Bound on completion size, in tokens.
    pub max_output_tokens: u32,

    /// Per-call timeout, enforced by both the HTTP client and the pipeline.
    ///
    /// Default: 60 seconds
    pub timeout: Duration,

    /// Preferred mode (None = constrained call when the backend supports it).
    pub mode: Option<ExtractionMode>,

    /// Maximum content attempts per run.
    pub max_attempts: usize,

    /// Maximum resends of one attempt after transport or rate-limit failures.
    pub max_transport_retries: usize,

    /// Whether the backend honours forced function calls.
    pub supports_tools: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let extraction = ExtractionConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: extraction.request_timeout,
            mode: None,
            max_attempts: extraction.max_attempts,
            max_transport_retries: extraction.max_transport_retries,
            supports_tools: true,
        }
    }
}

impl ClientConfig {
    /// Create a new `ClientConfig` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection settings for the HTTP adapter.
    #[must_use]
    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            supports_tools: self.supports_tools,
        }
    }

    /// Retry and timeout policy for the pipeline.
    #[must_use]
    pub fn extraction(&self) -> ExtractionConfig {
        let config = ExtractionConfig::default()
            .with_max_attempts(self.max_attempts)
            .with_max_transport_retries(self.max_transport_retries)
            .with_request_timeout(self.timeout);
        match self.mode {
            Some(mode) => config.with_mode(mode),
            None => config,
        }
    }

    /// Prompt settings for the pipeline.
    #[must_use]
    pub fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new()
            .with_model(self.model.clone())
            .with_max_output_tokens(self.max_output_tokens)
    }
}
