//! The schema-extract binary: extract schema-conforming JSON from text.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use schema_extract::batch::DEFAULT_CONCURRENCY;
use schema_extract::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extracts one document and writes the result to a file
    Extract {
        #[command(flatten)]
        common: CommonArgs,
        /// Text source: file path, URL, or the text itself
        #[arg(long)]
        text: String,
        /// Output file
        #[arg(long, default_value = "output.json")]
        output: PathBuf,
    },
    /// Extracts many documents against one schema
    Batch {
        #[command(flatten)]
        common: CommonArgs,
        /// Text sources: file paths, URLs, or inline text
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Directory receiving one JSON file per input
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Maximum runs in flight
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// API key (falls back to OPENAI_API_KEY, then OPENAI_KEY)
    #[arg(long)]
    api_key: Option<String>,
    /// Schema source: file path, URL, or inline JSON
    #[arg(long)]
    schema: String,
    /// Model identifier
    #[arg(long, default_value = extract_core::prompt::DEFAULT_MODEL)]
    model: String,
    /// constrained-call or embedded-schema
    #[arg(long)]
    mode: Option<ExtractionMode>,
    /// Maximum corrective attempts
    #[arg(long, default_value_t = 3)]
    max_attempts: usize,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    /// API root of an OpenAI-compatible server
    #[arg(long, default_value = openai_adapter::DEFAULT_BASE_URL)]
    base_url: String,
}

impl CommonArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            mode: self.mode,
            max_attempts: self.max_attempts,
            ..ClientConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<Error>() {
                Some(e) => eprintln!("Error: {}", e.diagnostic()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Extract {
            common,
            text,
            output,
        } => {
            let extractor = build_extractor(&common)?;
            extractor
                .extract_to_file(&common.schema, &text, &output, &cancel)
                .await?;
            println!("Extraction complete. Output saved to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Batch {
            common,
            inputs,
            out_dir,
            concurrency,
        } => {
            let extractor = build_extractor(&common)?;
            let report = extractor
                .extract_batch(&common.schema, &inputs, &out_dir, concurrency, &cancel)
                .await?;

            for outcome in report.failures() {
                if let Err(e) = &outcome.result {
                    eprintln!(
                        "Failed: {}\n{}",
                        Source::from_arg(&outcome.item.input).describe(),
                        e.diagnostic()
                    );
                }
            }
            println!(
                "Batch complete. {}/{} outputs saved to {}",
                report.succeeded(),
                report.outcomes.len(),
                out_dir.display()
            );
            Ok(if report.succeeded() == report.outcomes.len() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn build_extractor(common: &CommonArgs) -> anyhow::Result<Extractor<OpenAiBackend>> {
    let api_key = ApiKey::resolve(common.api_key.as_deref())?;
    Extractor::openai(&api_key, &common.client_config()).context("failed to set up the backend")
}
