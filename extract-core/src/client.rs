//! The model backend seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::ExtractionRequest;

/// Which channel produced a response's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMechanism {
    /// Arguments of the forced `extract_information` call.
    ConstrainedCall,
    /// Plain assistant text, to be parsed leniently.
    FreeForm,
}

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
}

/// Raw completion returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    /// The payload text (call arguments or assistant content).
    pub raw: String,
    /// Which channel produced `raw`.
    pub mechanism: ResponseMechanism,
    /// Model that answered, when reported.
    pub model: Option<String>,
    /// Token usage, when reported.
    pub usage: Option<TokenUsage>,
}

impl ExtractionResponse {
    /// Creates a response with no metadata beyond the mechanism.
    #[must_use]
    pub fn new(raw: impl Into<String>, mechanism: ResponseMechanism) -> Self {
        Self {
            raw: raw.into(),
            mechanism,
            model: None,
            usage: None,
        }
    }

    /// Records the answering model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Records token usage.
    #[must_use]
    pub const fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Failures reaching or being served by the backend.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network, authentication or timeout failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend asked us to slow down.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Backend message.
        message: String,
        /// Delay requested by the backend, if any.
        retry_after: Option<Duration>,
    },

    /// The backend rejected the request for reasons unrelated to throttling.
    #[error("Provider error (status {status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Backend message.
        message: String,
    },
}

impl ClientError {
    /// Whether the driver may resend the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited { .. })
    }

    /// Delay requested by the backend.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A chat-completion backend able to serve extraction requests.
///
/// Implementations make exactly one outbound call per [`send`](Self::send)
/// and never retry internally; the pipeline owns retry policy.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Whether the backend honours a forced function/tool call.
    fn supports_constrained_calls(&self) -> bool {
        true
    }

    /// Sends one request.
    async fn send(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ClientError>;
}

#[async_trait]
impl<T: ExtractionClient + ?Sized> ExtractionClient for Arc<T> {
    fn supports_constrained_calls(&self) -> bool {
        (**self).supports_constrained_calls()
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ClientError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: ExtractionClient + ?Sized> ExtractionClient for Box<T> {
    fn supports_constrained_calls(&self) -> bool {
        (**self).supports_constrained_calls()
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ClientError> {
        (**self).send(request).await
    }
}
