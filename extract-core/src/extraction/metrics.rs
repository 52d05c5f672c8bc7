//! Metrics tracking and token estimation for extraction operations.

use std::time::Duration;

use serde::Serialize;

use crate::client::{ExtractionResponse, TokenUsage};
use crate::prompt::ExtractionRequest;

/// Metrics collected during an extraction operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionMetrics {
    /// Total number of content attempts made.
    pub total_attempts: usize,
    /// Resends after transport or rate-limit failures, across all attempts.
    pub transport_retries: usize,
    /// Wall-clock time elapsed during extraction.
    pub wall_time: Duration,
    /// Estimated input tokens sent to the backend.
    pub estimated_input_tokens: usize,
    /// Estimated output tokens received from the backend.
    pub estimated_output_tokens: usize,
    /// Usage summed over responses that reported it.
    pub reported_usage: Option<TokenUsage>,
}

impl ExtractionMetrics {
    pub(crate) fn record_request(&mut self, request: &ExtractionRequest) {
        self.estimated_input_tokens += request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum::<usize>();
    }

    pub(crate) fn record_response(&mut self, response: &ExtractionResponse) {
        self.estimated_output_tokens += estimate_tokens(&response.raw);
        if let Some(usage) = response.usage {
            let total = self.reported_usage.get_or_insert_with(TokenUsage::default);
            total.prompt_tokens = total.prompt_tokens.saturating_add(usage.prompt_tokens);
            total.completion_tokens = total
                .completion_tokens
                .saturating_add(usage.completion_tokens);
        }
    }
}

/// Estimate token count from text using the standard 4-chars-per-token heuristic.
///
/// Uses `chars().count()` to handle UTF-8 correctly (not `len()` which counts bytes).
/// Returns ceiling division to avoid underestimation.
///
/// # Examples
///
/// ```
/// use extract_core::extraction::estimate_tokens;
///
/// assert_eq!(estimate_tokens("hello"), 2);  // 5 chars / 4 = 1.25 -> 2
/// assert_eq!(estimate_tokens("hello world"), 3);  // 11 chars / 4 = 2.75 -> 3
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResponseMechanism;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("hello world"), 3); // 11 chars
    }

    #[test]
    fn test_estimate_tokens_utf8() {
        // UTF-8 characters: "你好" is 2 chars but 6 bytes
        assert_eq!(estimate_tokens("你好"), 1); // 2 chars / 4 = 0.5 -> 1
        assert_eq!(estimate_tokens("hello 世界"), 2); // 8 chars / 4 = 2
    }

    #[test]
    fn test_reported_usage_accumulates() {
        let mut metrics = ExtractionMetrics::default();
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 4,
        };
        let response = ExtractionResponse::new("{}", ResponseMechanism::FreeForm).with_usage(usage);
        metrics.record_response(&response);
        metrics.record_response(&response);
        metrics.record_response(&ExtractionResponse::new("{}", ResponseMechanism::FreeForm));

        assert_eq!(
            metrics.reported_usage,
            Some(TokenUsage {
                prompt_tokens: 20,
                completion_tokens: 8
            })
        );
        assert_eq!(metrics.estimated_output_tokens, 3);
    }
}
