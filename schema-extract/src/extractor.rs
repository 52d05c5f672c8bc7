//! Single-document driver: load inputs, extract, write the result.

use std::path::Path;

use extract_core::client::ExtractionClient;
use extract_core::extraction::{Extraction, ExtractionPipeline};
use extract_core::schema::Schema;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::batch::{run_batch, BatchItem, BatchReport};
use crate::config::{ApiKey, ClientConfig};
use crate::errors::Error;
use crate::openai::OpenAiBackend;
use crate::sink::write_json;
use crate::sources::{load_schema, load_text};

/// Loads inputs, drives the pipeline and writes results.
///
/// Inputs are fully resolved before the first model call, so an unreachable
/// schema or text never costs a request.
pub struct Extractor<C> {
    pipeline: ExtractionPipeline<C>,
    http: reqwest::Client,
}

impl Extractor<OpenAiBackend> {
    /// Creates an extractor talking to an OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the HTTP client cannot be built.
    pub fn openai(api_key: &ApiKey, config: &ClientConfig) -> Result<Self, Error> {
        let backend = OpenAiBackend::new(api_key, config)?;
        Ok(Self::with_client(backend, config))
    }
}

impl<C: ExtractionClient> Extractor<C> {
    /// Creates an extractor over any backend.
    #[must_use]
    pub fn with_client(client: C, config: &ClientConfig) -> Self {
        let pipeline = ExtractionPipeline::with_config(client, config.extraction())
            .prompts(config.prompts());
        Self {
            pipeline,
            http: reqwest::Client::new(),
        }
    }

    /// The underlying pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &ExtractionPipeline<C> {
        &self.pipeline
    }

    /// Loads the schema named by `arg` (file, URL or inline JSON).
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` or `InvalidSchema`, wrapped in `Error::Extraction`.
    pub async fn load_schema(&self, arg: &str) -> Result<Schema, Error> {
        Ok(load_schema(arg, &self.http).await?)
    }

    /// Extracts from the inputs named by `schema_arg` and `text_arg`.
    ///
    /// # Errors
    ///
    /// Any input or extraction failure.
    pub async fn extract(
        &self,
        schema_arg: &str,
        text_arg: &str,
        cancel: &CancellationToken,
    ) -> Result<Extraction, Error> {
        let schema = self.load_schema(schema_arg).await?;
        let text = load_text(text_arg, &self.http).await?;
        Ok(self.pipeline.extract_with_cancel(&schema, &text, cancel).await?)
    }

    /// Extracts and writes the value to `output`.
    ///
    /// # Errors
    ///
    /// Any input, extraction or write failure. Nothing is written on failure.
    pub async fn extract_to_file(
        &self,
        schema_arg: &str,
        text_arg: &str,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<Extraction, Error> {
        let extraction = self.extract(schema_arg, text_arg, cancel).await?;
        write_json(output, &extraction.value).await?;
        info!(
            output = %output.display(),
            attempts = extraction.metrics.total_attempts,
            run_id = %extraction.run_id,
            "result written"
        );
        Ok(extraction)
    }

    /// Extracts every input against one schema, writing one file per input.
    ///
    /// # Errors
    ///
    /// Only a schema failure aborts the batch; per-item failures are in the report.
    pub async fn extract_batch(
        &self,
        schema_arg: &str,
        inputs: &[String],
        out_dir: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, Error> {
        let schema = self.load_schema(schema_arg).await?;
        let items = BatchItem::plan(inputs, out_dir);
        Ok(run_batch(&self.pipeline, &schema, items, concurrency, &self.http, cancel).await)
    }
}
