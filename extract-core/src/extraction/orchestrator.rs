//! Orchestration layer for retry/validation feedback loops in structured extraction.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::config::ExtractionConfig;
use super::error::{AttemptRecord, ExtractionError};
use super::feedback::build_correction;
use super::metrics::ExtractionMetrics;
use crate::client::{ClientError, ExtractionClient, ExtractionResponse, ResponseMechanism};
use crate::prompt::{ExtractionMode, ExtractionRequest, PromptBuilder};
use crate::schema::Schema;
use crate::validator::validate;

/// A validated extraction result.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    /// The value; conforms to the schema it was extracted with.
    pub value: Value,
    /// Mode the requests were built in.
    pub mode: ExtractionMode,
    /// Channel that produced the accepted answer.
    pub mechanism: ResponseMechanism,
    /// Metrics across all attempts.
    pub metrics: ExtractionMetrics,
    /// Identifier of the run, as recorded in logs.
    pub run_id: Uuid,
}

/// Terminal result of one extraction run.
pub type ExtractionOutcome = Result<Extraction, ExtractionError>;

/// Drives build → send → validate with bounded corrective and transport retries.
///
/// The pipeline holds no per-run state, so one instance can serve many
/// concurrent runs.
pub struct ExtractionPipeline<C> {
    client: C,
    prompts: PromptBuilder,
    config: ExtractionConfig,
}

impl<C: ExtractionClient> ExtractionPipeline<C> {
    /// Creates a pipeline with default prompts and configuration.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self::with_config(client, ExtractionConfig::default())
    }

    /// Creates a pipeline with the given configuration.
    #[must_use]
    pub fn with_config(client: C, config: ExtractionConfig) -> Self {
        Self {
            client,
            prompts: PromptBuilder::default(),
            config,
        }
    }

    /// Replaces the prompt builder (model, output bound, wording).
    #[must_use]
    pub fn prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Sets the maximum number of content attempts (fluent builder pattern).
    #[must_use]
    pub const fn max_attempts(mut self, max: usize) -> Self {
        self.config.max_attempts = max;
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// The backend.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Mode requests will be built in.
    ///
    /// A forced constrained-call mode still falls back to embedded-schema mode
    /// when the backend cannot honour function calls.
    #[must_use]
    pub fn resolve_mode(&self) -> ExtractionMode {
        let supports_calls = self.client.supports_constrained_calls();
        match self.config.mode {
            Some(ExtractionMode::ConstrainedCall) if !supports_calls => {
                warn!("backend lacks constrained calls; falling back to embedded-schema mode");
                ExtractionMode::EmbeddedSchema
            }
            Some(mode) => mode,
            None if supports_calls => ExtractionMode::ConstrainedCall,
            None => ExtractionMode::EmbeddedSchema,
        }
    }

    /// Runs one extraction.
    pub async fn extract(&self, schema: &Schema, text: &str) -> ExtractionOutcome {
        self.extract_with_cancel(schema, text, &CancellationToken::new())
            .await
    }

    /// Runs one extraction, checking `cancel` before every backend call.
    ///
    /// A cancellation observed after a call was dispatched lets the call
    /// finish and discards its answer.
    pub async fn extract_with_cancel(
        &self,
        schema: &Schema,
        text: &str,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("extraction", %run_id);
        self.run(schema, text, cancel, run_id).instrument(span).await
    }

    /// Derives the schema from `T`, extracts, and deserializes the value.
    pub async fn extract_typed<T>(
        &self,
        text: &str,
    ) -> Result<(T, ExtractionMetrics), ExtractionError>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = Schema::for_type::<T>()?;
        let extraction = self.extract(&schema, text).await?;

        let typed = serde_json::from_value(extraction.value.clone()).map_err(|e| {
            ExtractionError::Deserialize {
                message: e.to_string(),
                value: extraction.value.clone(),
            }
        })?;

        Ok((typed, extraction.metrics))
    }

    async fn run(
        &self,
        schema: &Schema,
        text: &str,
        cancel: &CancellationToken,
        run_id: Uuid,
    ) -> ExtractionOutcome {
        let start = Instant::now();
        let mode = self.resolve_mode();
        let max_attempts = self.config.max_attempts.max(1);
        let mut metrics = ExtractionMetrics::default();
        let mut corrections: Vec<String> = Vec::new();
        let mut history: Vec<AttemptRecord> = Vec::new();

        info!(%mode, max_attempts, text_chars = text.chars().count(), "starting extraction");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self
                .prompts
                .build_corrective(schema, text, mode, &corrections);
            metrics.record_request(&request);
            debug!(attempt, corrections = corrections.len(), "request built");

            let response = self
                .send_with_retries(&request, cancel, attempt, &mut metrics)
                .await?;
            metrics.record_response(&response);

            let failure = match validate(&response, schema) {
                Ok(value) => {
                    metrics.total_attempts = attempt;
                    metrics.wall_time = start.elapsed();
                    info!(
                        attempt,
                        mechanism = ?response.mechanism,
                        elapsed_ms = metrics.wall_time.as_millis(),
                        "extraction validated"
                    );
                    return Ok(Extraction {
                        value,
                        mode,
                        mechanism: response.mechanism,
                        metrics,
                        run_id,
                    });
                }
                Err(failure) => failure,
            };

            warn!(
                attempt,
                max_attempts,
                kind = failure.label(),
                path = failure.primary_path().unwrap_or(""),
                "answer rejected"
            );
            history.push(AttemptRecord {
                attempt_number: attempt,
                mode,
                failure: failure.clone(),
                elapsed: start.elapsed(),
            });

            if attempt >= max_attempts {
                metrics.total_attempts = attempt;
                metrics.wall_time = start.elapsed();
                return Err(ExtractionError::RetryBudgetExhausted {
                    attempts: attempt,
                    max_attempts,
                    last_failure: failure,
                    history,
                    metrics,
                });
            }

            corrections.push(build_correction(&failure, attempt, max_attempts));
        }
    }

    /// Sends one request, resending on transport and rate-limit failures.
    async fn send_with_retries(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
        attempt: usize,
        metrics: &mut ExtractionMetrics,
    ) -> Result<ExtractionResponse, ExtractionError> {
        let mut retry = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ExtractionError::Cancelled {
                    stage: format!("before sending attempt {attempt}"),
                });
            }

            let result = match tokio::time::timeout(
                self.config.request_timeout,
                self.client.send(request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Transport(format!(
                    "request timed out after {:?}",
                    self.config.request_timeout
                ))),
            };

            if cancel.is_cancelled() {
                debug!(attempt, "discarding answer received after cancellation");
                return Err(ExtractionError::Cancelled {
                    stage: format!("while attempt {attempt} was in flight"),
                });
            }

            let error = match result {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            let calls = retry + 1;
            if !error.is_retryable() || retry >= self.config.max_transport_retries {
                warn!(attempt, calls, error = %error, "backend call failed");
                return Err(into_extraction_error(error, attempt, calls));
            }

            let delay = error
                .retry_after()
                .unwrap_or_else(|| self.config.backoff_delay(retry))
                .min(self.config.retry_max_delay);
            warn!(
                attempt,
                calls,
                delay_ms = delay.as_millis(),
                error = %error,
                "backend call failed, retrying"
            );

            retry += 1;
            metrics.transport_retries += 1;

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    return Err(ExtractionError::Cancelled {
                        stage: format!("while backing off before resending attempt {attempt}"),
                    });
                }
            }
        }
    }
}

fn into_extraction_error(error: ClientError, attempt: usize, calls: usize) -> ExtractionError {
    match error {
        ClientError::Transport(message) => ExtractionError::Transport {
            message,
            attempt,
            calls,
        },
        ClientError::RateLimited {
            message,
            retry_after,
        } => ExtractionError::RateLimited {
            message,
            retry_after,
            attempt,
            calls,
        },
        ClientError::Provider { status, message } => ExtractionError::Provider {
            status,
            message,
            attempt,
        },
    }
}
