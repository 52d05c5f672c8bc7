//! Batch driver: many texts against one schema with bounded concurrency.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use extract_core::client::ExtractionClient;
use extract_core::extraction::{ExtractionMetrics, ExtractionPipeline};
use extract_core::schema::Schema;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::Error;
use crate::sink::write_json;
use crate::sources::{load_text, Source};

/// Default number of runs in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// One input of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Text source argument (file, URL or inline text).
    pub input: String,
    /// Where the result is written.
    pub output: PathBuf,
}

impl BatchItem {
    /// Pairs each input with a file in `out_dir`.
    ///
    /// Files keep their stem (`notes/a.txt` → `a.json`); URLs and inline text
    /// are numbered by position (`item-3.json`). A name already taken gets a
    /// `-2`, `-3`, ... suffix, so no two items share an output file.
    #[must_use]
    pub fn plan(inputs: &[String], out_dir: &Path) -> Vec<Self> {
        let mut taken: HashSet<String> = HashSet::new();
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let stem = match Source::from_arg(input) {
                    Source::File(path) => path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("item-{}", index + 1)),
                    Source::Url(_) | Source::Inline(_) => format!("item-{}", index + 1),
                };
                let name = unique_name(&stem, &mut taken);
                Self {
                    input: input.clone(),
                    output: out_dir.join(format!("{name}.json")),
                }
            })
            .collect()
    }
}

fn unique_name(stem: &str, taken: &mut HashSet<String>) -> String {
    let mut name = stem.to_string();
    let mut suffix = 1;
    while !taken.insert(name.clone()) {
        suffix += 1;
        name = format!("{stem}-{suffix}");
    }
    name
}

/// Result of one batch item.
#[derive(Debug)]
pub struct BatchOutcome {
    /// The item.
    pub item: BatchItem,
    /// Metrics on success, the error otherwise.
    pub result: Result<ExtractionMetrics, Error>,
}

/// Totals of a finished batch.
#[derive(Debug)]
pub struct BatchReport {
    /// Per-item outcomes, in input order.
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Number of items written successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Items that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Runs every item through `pipeline`, at most `concurrency` at a time.
///
/// A failing item is recorded in the report and does not stop the others.
/// Cancelling `cancel` makes pending items fail with `Cancelled`.
pub async fn run_batch<C: ExtractionClient>(
    pipeline: &ExtractionPipeline<C>,
    schema: &Schema,
    items: Vec<BatchItem>,
    concurrency: usize,
    http: &reqwest::Client,
    cancel: &CancellationToken,
) -> BatchReport {
    let start = Instant::now();
    let total = items.len();
    info!(total, concurrency, "starting batch");

    let mut outcomes: Vec<(usize, BatchOutcome)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move {
            let result = run_item(pipeline, schema, &item, http, cancel).await;
            match &result {
                Ok(_) => info!(index, output = %item.output.display(), "batch item written"),
                Err(e) => warn!(
                    index,
                    input = %Source::from_arg(&item.input).describe(),
                    error = %e,
                    "batch item failed"
                ),
            }
            (index, BatchOutcome { item, result })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let report = BatchReport {
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };
    info!(
        total,
        succeeded = report.succeeded(),
        elapsed_ms = start.elapsed().as_millis(),
        "batch finished"
    );
    report
}

async fn run_item<C: ExtractionClient>(
    pipeline: &ExtractionPipeline<C>,
    schema: &Schema,
    item: &BatchItem,
    http: &reqwest::Client,
    cancel: &CancellationToken,
) -> Result<ExtractionMetrics, Error> {
    let text = load_text(&item.input, http).await?;
    let extraction = pipeline.extract_with_cancel(schema, &text, cancel).await?;
    write_json(&item.output, &extraction.value).await?;
    Ok(extraction.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plan_names_outputs() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "text").unwrap();
        let file_arg = file.path().to_str().unwrap().to_string();
        let stem = file.path().file_stem().unwrap().to_str().unwrap().to_string();

        let inputs = vec![
            file_arg.clone(),
            "https://example.com/page".to_string(),
            "inline text".to_string(),
        ];
        let plan = BatchItem::plan(&inputs, Path::new("out"));

        assert_eq!(plan[0].output, Path::new("out").join(format!("{stem}.json")));
        assert_eq!(plan[1].output, Path::new("out").join("item-2.json"));
        assert_eq!(plan[2].output, Path::new("out").join("item-3.json"));
        assert_eq!(plan[0].input, file_arg);
    }

    #[test]
    fn test_plan_never_reuses_an_output() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a").join("notes.txt");
        let second = dir.path().join("b").join("notes.txt");
        let numbered = dir.path().join("item-3.txt");
        for path in [&first, &second, &numbered] {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "text").unwrap();
        }

        let inputs = vec![
            first.to_str().unwrap().to_string(),
            second.to_str().unwrap().to_string(),
            "inline text".to_string(),
            numbered.to_str().unwrap().to_string(),
        ];
        let plan = BatchItem::plan(&inputs, Path::new("out"));

        let outputs: Vec<_> = plan.iter().map(|item| item.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                Path::new("out").join("notes.json"),
                Path::new("out").join("notes-2.json"),
                Path::new("out").join("item-3.json"),
                Path::new("out").join("item-3-2.json"),
            ]
        );
    }
}
