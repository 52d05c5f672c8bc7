//! Schema-guided structured extraction.
//!
//! Given a JSON Schema and a source text, the pipeline builds a model request
//! that asks for schema-conformant output, sends it through an
//! [`ExtractionClient`](client::ExtractionClient), and validates the answer,
//! re-prompting with the specific validation error until the answer conforms
//! or the attempt budget runs out.
//!
//! ```no_run
//! # use extract_core::prelude::*;
//! # async fn example(client: impl ExtractionClient) -> Result<(), ExtractionError> {
//! let schema = Schema::from_json_str(r#"{"type":"object","properties":{"name":{"type":"string"}}}"#)?;
//! let pipeline = ExtractionPipeline::new(client).max_attempts(3);
//! let extraction = pipeline.extract(&schema, "My name is Ada.").await?;
//! println!("{}", extraction.value);
//! # Ok(())
//! # }
//! ```

/// The model backend seam.
pub mod client;
/// Retry loop, errors, metrics and feedback.
pub mod extraction;
/// Request construction.
pub mod prompt;
/// Schema loading and structural validation.
pub mod schema;
/// Response parsing and validation.
pub mod validator;

/// Common traits and types for ergonomic usage of the pipeline.
pub mod prelude {
    pub use crate::client::{
        ClientError, ExtractionClient, ExtractionResponse, ResponseMechanism, TokenUsage,
    };
    pub use crate::extraction::{
        Extraction, ExtractionConfig, ExtractionError, ExtractionMetrics, ExtractionOutcome,
        ExtractionPipeline,
    };
    pub use crate::prompt::{ExtractionMode, ExtractionRequest, PromptBuilder};
    pub use crate::schema::{Schema, SchemaError, Violation};
    pub use crate::validator::ValidationFailure;
}
