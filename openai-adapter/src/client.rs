use crate::error::OpenAiError;
use crate::types::{ApiErrorBody, ChatCompletion, ChatRequest, OpenAiConfig};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    config: OpenAiConfig,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"<redacted>")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Creates a client for `config.base_url` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns `OpenAiError::InvalidConfig` if the key is empty or the HTTP
    /// client cannot be built.
    pub fn new(api_key: impl Into<String>, config: OpenAiConfig) -> Result<Self, OpenAiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OpenAiError::InvalidConfig("API key is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OpenAiError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    /// Connection settings.
    #[must_use]
    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Sends one chat completion request.
    ///
    /// # Errors
    ///
    /// - `Timeout` / `Network` when the server cannot be reached
    /// - `Unauthorized` on 401 and 403
    /// - `RateLimited` on 429, carrying `Retry-After` when present
    /// - `Api` on any other non-success status
    /// - `Parse` when the body is not a chat completion
    pub async fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, OpenAiError> {
        let start = Instant::now();
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OpenAiError::Timeout(self.config.timeout)
                } else {
                    OpenAiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body, status);
            warn!(status = status.as_u16(), %message, "chat completion rejected");

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OpenAiError::Unauthorized {
                    status: status.as_u16(),
                    message,
                },
                StatusCode::TOO_MANY_REQUESTS => OpenAiError::RateLimited {
                    message,
                    retry_after,
                },
                _ => OpenAiError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| OpenAiError::Network(e.to_string()))?;
        let completion: ChatCompletion =
            serde_json::from_str(&body).map_err(|e| OpenAiError::Parse(e.to_string()))?;

        debug!(
            elapsed_ms = start.elapsed().as_millis(),
            model = completion.model.as_deref().unwrap_or(""),
            "chat completion received"
        );
        Ok(completion)
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}
