//! # schema-extract
//!
//! Extract JSON that conforms to a caller-supplied JSON Schema from free text.
//!
//! This crate wires the [`extract_core`] pipeline to an OpenAI-compatible
//! backend and adds the pieces a command-line tool needs: schema and text
//! loading from files, URLs or inline strings, credential resolution, the
//! result sink, and a batch driver.
//!
//! ## Example
//!
//! ```no_run
//! # use schema_extract::prelude::*;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api_key = ApiKey::resolve(None)?;
//! let extractor = Extractor::openai(&api_key, &ClientConfig::default())?;
//!
//! let extraction = extractor
//!     .extract(
//!         r#"{"type": "object", "properties": {"name": {"type": "string"}}}"#,
//!         "Ada Lovelace wrote the first program.",
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{}", extraction.value);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Batch driver.
pub mod batch;

/// Client configuration and credential resolution.
pub mod config;

/// Public error types.
pub mod errors;

/// Single-document driver.
pub mod extractor;

/// OpenAI-compatible backend.
pub mod openai;

/// Commonly used types and traits.
pub mod prelude;

/// Result sink.
pub mod sink;

/// Schema and text sources.
pub mod sources;
