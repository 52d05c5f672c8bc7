//! Loading the schema and the source text from files, URLs or inline strings.

use std::path::PathBuf;

use extract_core::extraction::ExtractionError;
use extract_core::schema::Schema;
use tracing::{debug, info};

/// Where an input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The argument itself is the content.
    Inline(String),
    /// A local file.
    File(PathBuf),
    /// An HTTP(S) URL fetched with GET.
    Url(String),
}

impl Source {
    /// Classifies a command-line argument.
    ///
    /// `http://` and `https://` prefixes select a URL, an existing path
    /// selects a file, and anything else is inline content.
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        let trimmed = arg.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::Url(trimmed.to_string());
        }
        let path = PathBuf::from(arg);
        if path.is_file() {
            Self::File(path)
        } else {
            Self::Inline(arg.to_string())
        }
    }

    /// Short description for logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Inline(text) => format!("inline ({} chars)", text.chars().count()),
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    /// Reads the content.
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::SourceUnavailable` when the file cannot be
    /// read, the URL cannot be fetched, or the server answers anything but 200.
    pub async fn resolve(&self, http: &reqwest::Client) -> Result<String, ExtractionError> {
        let unavailable = |reason: String| ExtractionError::SourceUnavailable {
            source_name: self.describe(),
            reason,
        };

        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => {
                debug!(path = %path.display(), "reading source file");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| unavailable(e.to_string()))
            }
            Self::Url(url) => {
                debug!(%url, "fetching source");
                let response = http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
                let status = response.status();
                if status != reqwest::StatusCode::OK {
                    return Err(unavailable(format!("HTTP status {}", status.as_u16())));
                }
                response.text().await.map_err(|e| unavailable(e.to_string()))
            }
        }
    }
}

/// Loads and compiles the schema named by `arg`.
///
/// Unlike text, a schema argument is only taken inline when it looks like a
/// JSON document; anything else must name an existing file or a URL.
///
/// # Errors
///
/// `SourceUnavailable` when the document cannot be obtained, `InvalidSchema`
/// when it is not a usable JSON Schema.
pub async fn load_schema(arg: &str, http: &reqwest::Client) -> Result<Schema, ExtractionError> {
    let source = Source::from_arg(arg);
    if let Source::Inline(inline) = &source {
        if !inline.trim_start().starts_with(['{', '[']) {
            return Err(ExtractionError::SourceUnavailable {
                source_name: arg.to_string(),
                reason: "no such file".to_string(),
            });
        }
    }
    let text = source.resolve(http).await?;
    let schema = Schema::from_json_str(&text)?;
    info!(source = %source.describe(), "schema loaded");
    Ok(schema)
}

/// Loads the source text named by `arg`.
///
/// # Errors
///
/// `SourceUnavailable` when the text cannot be obtained.
pub async fn load_text(arg: &str, http: &reqwest::Client) -> Result<String, ExtractionError> {
    let source = Source::from_arg(arg);
    let text = source.resolve(http).await?;
    info!(source = %source.describe(), chars = text.chars().count(), "text loaded");
    Ok(text)
}
