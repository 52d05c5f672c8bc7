//! Error types for extraction operations with attempt history tracking.

use std::time::Duration;

use thiserror::Error;

use super::feedback::{describe_failure, truncate_chars, RAW_EXCERPT_CHARS};
use super::metrics::ExtractionMetrics;
use crate::prompt::ExtractionMode;
use crate::schema::SchemaError;
use crate::validator::ValidationFailure;

/// Record of a single rejected extraction attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The attempt number (1-indexed).
    pub attempt_number: usize,
    /// Mode the request was built in.
    pub mode: ExtractionMode,
    /// Why the answer was rejected; carries the raw response.
    pub failure: ValidationFailure,
    /// Elapsed time at this attempt.
    pub elapsed: Duration,
}

/// Errors that can occur during extraction operations.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The schema or the text could not be obtained. Never retried.
    #[error("Source unavailable ({source_name}): {reason}")]
    SourceUnavailable {
        /// Which input could not be loaded.
        source_name: String,
        /// Why.
        reason: String,
    },

    /// The schema document is not usable. Never retried.
    #[error("Invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// The backend could not be reached within the transport budget.
    #[error("Transport error on attempt {attempt} after {calls} calls: {message}")]
    Transport {
        /// Last transport message.
        message: String,
        /// Content attempt during which the budget ran out.
        attempt: usize,
        /// Calls made for that attempt.
        calls: usize,
    },

    /// The backend kept throttling within the transport budget.
    #[error("Rate limited on attempt {attempt} after {calls} calls: {message}")]
    RateLimited {
        /// Last backend message.
        message: String,
        /// Last delay requested by the backend.
        retry_after: Option<Duration>,
        /// Content attempt during which the budget ran out.
        attempt: usize,
        /// Calls made for that attempt.
        calls: usize,
    },

    /// The backend rejected the request. Never retried.
    #[error("Provider error on attempt {attempt} (status {status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Backend message.
        message: String,
        /// Content attempt that was rejected.
        attempt: usize,
    },

    /// Maximum content attempts exceeded; every answer was malformed or non-conforming.
    #[error("Extraction failed after {attempts} attempts (max: {max_attempts}): {last_failure}")]
    RetryBudgetExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// Maximum attempts allowed.
        max_attempts: usize,
        /// Rejection of the final attempt.
        last_failure: ValidationFailure,
        /// History of all rejected attempts.
        history: Vec<AttemptRecord>,
        /// Metrics tracked across all attempts.
        metrics: ExtractionMetrics,
    },

    /// The run was cancelled.
    #[error("Extraction cancelled {stage}")]
    Cancelled {
        /// Where the cancellation was observed.
        stage: String,
    },

    /// A validated value could not be deserialized into the requested type.
    #[error("Deserialization to target type failed: {message}")]
    Deserialize {
        /// Serde message.
        message: String,
        /// The validated value.
        value: serde_json::Value,
    },
}

impl ExtractionError {
    /// Whether the error happened before any backend call could be made.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::InvalidSchema(_))
    }

    /// Multi-line report with enough detail to reproduce the failure.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::RetryBudgetExhausted {
                attempts,
                max_attempts,
                last_failure,
                history,
                ..
            } => {
                let mut report =
                    format!("stage: corrective retry {attempts}/{max_attempts} exhausted\n");
                for record in history {
                    report.push_str(&format!(
                        "attempt {} ({}): {}\n",
                        record.attempt_number, record.mode, record.failure
                    ));
                }
                report.push_str(&describe_failure(last_failure));
                report
            }
            Self::Transport { attempt, calls, .. } | Self::RateLimited { attempt, calls, .. } => {
                format!(
                    "stage: sending attempt {attempt}, transport budget exhausted after {calls} calls\n{self}"
                )
            }
            Self::Provider { attempt, .. } => format!("stage: sending attempt {attempt}\n{self}"),
            Self::SourceUnavailable { .. } | Self::InvalidSchema(_) => {
                format!("stage: loading inputs (no model call made)\n{self}")
            }
            Self::Cancelled { .. } => self.to_string(),
            Self::Deserialize { value, .. } => format!(
                "stage: converting validated value\n{self}\nvalue: {}",
                truncate_chars(&value.to_string(), RAW_EXCERPT_CHARS)
            ),
        }
    }
}
