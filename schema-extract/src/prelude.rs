//! Common imports for schema-extract usage.
//!
//! ```
//! use schema_extract::prelude::*;
//! ```
//!
//! Re-exports the drivers, configuration and error types, plus the core
//! pipeline types needed to plug in a custom backend.

pub use crate::batch::{BatchItem, BatchOutcome, BatchReport};
pub use crate::config::{ApiKey, ClientConfig};
pub use crate::errors::Error;
pub use crate::extractor::Extractor;
pub use crate::openai::OpenAiBackend;
pub use crate::sources::Source;

pub use extract_core::prelude::*;
pub use tokio_util::sync::CancellationToken;
