//! Public error types for schema-extract.

use extract_core::extraction::ExtractionError;
use extract_core::schema::SchemaError;
use openai_adapter::OpenAiError;
use thiserror::Error;

/// Errors surfaced by the facade and the binary.
///
/// Extraction failures pass through unchanged so callers can still reach the
/// attempt history and the diagnostic report.
#[derive(Debug, Error)]
pub enum Error {
    /// No credential was given and none was found in the environment.
    #[error("No API key found. Pass --api-key or set OPENAI_API_KEY (or OPENAI_KEY)")]
    MissingApiKey,

    /// The extraction run failed.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    /// The backend client could not be constructed.
    #[error("Backend setup failed: {0}")]
    Backend(#[from] OpenAiError),

    /// The result could not be written.
    #[error("Failed to write {path}: {source}")]
    Sink {
        /// Destination path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error (invalid settings or options).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::Extraction(ExtractionError::InvalidSchema(err))
    }
}

impl Error {
    /// Multi-line report for terminal output.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Extraction(err) => err.diagnostic(),
            other => other.to_string(),
        }
    }
}
