//! Configuration for extraction retry behavior.

use std::time::Duration;

use crate::prompt::ExtractionMode;

/// Configuration for extraction retry behavior.
///
/// Two budgets are kept apart: `max_attempts` bounds corrective re-prompts
/// after malformed or non-conforming answers, `max_transport_retries` bounds
/// resends after network failures and throttling within one attempt.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Maximum number of content attempts, the first one included (default: 3).
    pub max_attempts: usize,
    /// Resends allowed per attempt after transport or rate-limit errors (default: 3).
    pub max_transport_retries: usize,
    /// First backoff delay; doubled on every resend (default: 500ms).
    pub retry_base_delay: Duration,
    /// Upper bound for any single backoff delay (default: 30s).
    pub retry_max_delay: Duration,
    /// Bound on one backend call (default: 60s).
    pub request_timeout: Duration,
    /// Forced mode; `None` picks constrained-call when the backend supports it.
    pub mode: Option<ExtractionMode>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_transport_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            mode: None,
        }
    }
}

impl ExtractionConfig {
    /// Set the maximum number of content attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the transport retry budget.
    #[must_use]
    pub const fn with_max_transport_retries(mut self, max: usize) -> Self {
        self.max_transport_retries = max;
        self
    }

    /// Set the backoff delays.
    #[must_use]
    pub const fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Force a mode instead of picking one from backend capabilities.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Backoff before resend number `retry` (zero-based).
    #[must_use]
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let factor = 1u32 << u32::try_from(retry.min(16)).unwrap_or(16);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}
