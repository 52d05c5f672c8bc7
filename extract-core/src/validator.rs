//! Response parsing and schema validation.
//!
//! Parsing is deliberately lenient: models driven in embedded-schema mode
//! often wrap their JSON in prose or Markdown fences. The strict parse runs
//! first; when it fails, fenced code blocks and then balanced `{..}` / `[..]`
//! spans are tried, and the largest span that parses wins.

use serde_json::Value;
use thiserror::Error;

use crate::client::ExtractionResponse;
use crate::schema::{Schema, Violation};

/// Why a single response was rejected. Both kinds are eligible for a
/// corrective retry.
#[derive(Debug, Clone, Error)]
pub enum ValidationFailure {
    /// The response did not contain a parseable JSON value.
    #[error("malformed JSON: {message}")]
    MalformedJson {
        /// Parser message for the strict parse attempt.
        message: String,
        /// The raw response text.
        raw: String,
    },

    /// The response parsed but does not conform to the schema.
    #[error("schema mismatch {}", summarize(.violations))]
    SchemaMismatch {
        /// Every violation found.
        violations: Vec<Violation>,
        /// The parsed (non-conforming) value.
        value: Value,
        /// The raw response text.
        raw: String,
    },
}

impl ValidationFailure {
    /// The raw response text that was rejected.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::MalformedJson { raw, .. } | Self::SchemaMismatch { raw, .. } => raw,
        }
    }

    /// Path of the first schema violation, if this is a mismatch.
    #[must_use]
    pub fn primary_path(&self) -> Option<&str> {
        match self {
            Self::MalformedJson { .. } => None,
            Self::SchemaMismatch { violations, .. } => violations.first().map(Violation::path),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MalformedJson { .. } => "malformed_json",
            Self::SchemaMismatch { .. } => "schema_mismatch",
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    match violations {
        [] => String::new(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

/// Parses `response` and validates it against `schema`.
pub fn validate(
    response: &ExtractionResponse,
    schema: &Schema,
) -> Result<Value, ValidationFailure> {
    validate_text(&response.raw, schema)
}

/// Same as [`validate`], on bare text.
pub fn validate_text(raw: &str, schema: &Schema) -> Result<Value, ValidationFailure> {
    let value = parse_lenient(raw).map_err(|message| ValidationFailure::MalformedJson {
        message,
        raw: raw.to_string(),
    })?;

    let violations = schema.validate(&value);
    if violations.is_empty() {
        Ok(value)
    } else {
        Err(ValidationFailure::SchemaMismatch {
            violations,
            value,
            raw: raw.to_string(),
        })
    }
}

/// Parses the largest JSON value found in `raw`.
///
/// Returns the strict parser's message when nothing parses.
pub fn parse_lenient(raw: &str) -> Result<Value, String> {
    let trimmed = raw.trim();
    let strict_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    if let Some(value) = largest_parse(fenced_blocks(trimmed)) {
        return Ok(value);
    }

    largest_parse(balanced_spans(trimmed)).ok_or(strict_error)
}

fn largest_parse<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<Value> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            serde_json::from_str::<Value>(candidate.trim())
                .ok()
                .map(|value| (candidate.len(), value))
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, value)| value)
}

/// Contents of ```-fenced blocks, with any language tag line removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    text.split("```")
        .skip(1)
        .step_by(2)
        .map(|block| match block.split_once('\n') {
            Some((tag, body)) if tag.trim().chars().all(char::is_alphanumeric) => body,
            _ => block,
        })
        .collect()
}

/// Every balanced `{..}` / `[..]` span that is not nested inside an earlier
/// span which already parsed.
fn balanced_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0;

    while start < bytes.len() {
        if matches!(bytes[start], b'{' | b'[') {
            if let Some(end) = matching_close(bytes, start) {
                let span = &text[start..=end];
                if serde_json::from_str::<Value>(span).is_ok() {
                    spans.push(span);
                    start = end + 1;
                    continue;
                }
            }
        }
        start += 1;
    }

    spans
}

/// Index of the bracket closing the one at `open`, honouring string literals.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
