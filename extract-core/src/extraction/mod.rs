//! Extraction retry and validation loop.
//!
//! - [`ExtractionPipeline`] - Async build/send/validate loop with corrective feedback
//! - [`ExtractionError`] - Typed error enum with attempt history
//! - [`ExtractionMetrics`] - Token and timing metrics
//! - [`ExtractionConfig`] - Retry budgets, backoff and timeout
//! - [`build_validation_feedback`] - Corrective instruction formatting

pub mod config;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod orchestrator;

pub use config::ExtractionConfig;
pub use error::{AttemptRecord, ExtractionError};
pub use feedback::build_validation_feedback;
pub use metrics::{estimate_tokens, ExtractionMetrics};
pub use orchestrator::{Extraction, ExtractionOutcome, ExtractionPipeline};
