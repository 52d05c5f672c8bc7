//! Corrective feedback builders for the retry loop.

use crate::schema::{display_path, Violation};
use crate::validator::ValidationFailure;

/// Raw responses are quoted back to the model, and into diagnostics, up to this many chars.
pub const RAW_EXCERPT_CHARS: usize = 500;

/// Build validation feedback for a schema mismatch.
///
/// Includes:
/// - Attempt counter (e.g., "Attempt 2/3")
/// - All violations with their paths
/// - Echoed submission (so the model can compare)
/// - Instruction to fix and resubmit
///
/// The schema itself is not repeated: it already travels in the function
/// declaration or the system instruction.
///
/// # Examples
///
/// ```
/// use extract_core::extraction::build_validation_feedback;
/// use extract_core::schema::Schema;
/// use serde_json::json;
///
/// let schema = Schema::from_value(json!({
///     "type": "object",
///     "properties": {"name": {"type": "string"}}
/// }))
/// .unwrap();
/// let instance = json!({"name": 123});
/// let violations = schema.validate(&instance);
///
/// let feedback = build_validation_feedback(&instance, &violations, 1, 3);
/// assert!(feedback.contains("Attempt 1/3"));
/// assert!(feedback.contains("did not match the schema"));
/// ```
#[must_use]
pub fn build_validation_feedback(
    instance: &serde_json::Value,
    violations: &[Violation],
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut feedback =
        format!("Attempt {attempt}/{max_attempts}: your answer did not match the schema.\n\n");

    feedback.push_str("Errors:\n");
    for violation in violations {
        feedback.push_str("  - ");
        feedback.push_str(&violation.to_string());
        feedback.push('\n');
    }

    feedback.push_str("\nYour submission:\n");
    let instance_str =
        serde_json::to_string_pretty(instance).unwrap_or_else(|_| instance.to_string());
    feedback.push_str(&truncate_chars(&instance_str, RAW_EXCERPT_CHARS));

    feedback.push_str("\n\nFix every error listed above and answer again.");

    feedback
}

/// Build parse error feedback for when the answer is not valid JSON.
///
/// Includes:
/// - Attempt counter
/// - Parse error message
/// - Truncated raw output (first 500 chars)
/// - Instruction to respond with valid JSON
///
/// # Examples
///
/// ```
/// use extract_core::extraction::feedback::build_parse_error_feedback;
///
/// let feedback = build_parse_error_feedback(
///     "This is not JSON at all!",
///     "expected value at line 1 column 1",
///     1,
///     3,
/// );
/// assert!(feedback.contains("Attempt 1/3"));
/// assert!(feedback.contains("Could not parse"));
/// ```
#[must_use]
pub fn build_parse_error_feedback(
    raw_text: &str,
    parse_error: &str,
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut feedback = format!(
        "Attempt {attempt}/{max_attempts}: Could not parse your answer as JSON.\n\n"
    );

    feedback.push_str("Parse error: ");
    feedback.push_str(parse_error);
    feedback.push_str("\n\n");

    feedback.push_str("Your answer (first 500 chars):\n");
    feedback.push_str(&truncate_chars(raw_text, RAW_EXCERPT_CHARS));

    feedback.push_str(
        "\n\nAnswer with a single valid JSON value matching the schema, and nothing else.",
    );

    feedback
}

/// Feedback for any rejected answer.
#[must_use]
pub fn build_correction(
    failure: &ValidationFailure,
    attempt: usize,
    max_attempts: usize,
) -> String {
    match failure {
        ValidationFailure::MalformedJson { message, raw } => {
            build_parse_error_feedback(raw, message, attempt, max_attempts)
        }
        ValidationFailure::SchemaMismatch {
            violations, value, ..
        } => build_validation_feedback(value, violations, attempt, max_attempts),
    }
}

/// Multi-line report of a rejected answer for terminal error messages.
#[must_use]
pub fn describe_failure(failure: &ValidationFailure) -> String {
    let mut report = format!("last failure: {}\n", failure.label());
    if let Some(path) = failure.primary_path() {
        report.push_str("failing path: ");
        report.push_str(display_path(path));
        report.push('\n');
    }
    match failure {
        ValidationFailure::MalformedJson { message, .. } => {
            report.push_str("parse error: ");
            report.push_str(message);
            report.push('\n');
        }
        ValidationFailure::SchemaMismatch { violations, .. } => {
            for violation in violations {
                report.push_str("  - ");
                report.push_str(&violation.to_string());
                report.push('\n');
            }
        }
    }
    report.push_str("last response: ");
    report.push_str(&truncate_chars(failure.raw(), RAW_EXCERPT_CHARS));
    report
}

/// Cuts `text` to at most `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
