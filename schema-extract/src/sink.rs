//! Writing extraction results to disk.

use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::errors::Error;

/// Renders `value` as UTF-8 JSON with a 4-space indent and a trailing newline.
#[must_use]
pub fn render(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut serializer).is_err() {
        // Unreachable for in-memory writes.
        return format!("{value}\n");
    }
    let mut out = String::from_utf8_lossy(&buf).into_owned();
    out.push('\n');
    out
}

/// Writes `value` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns `Error::Sink` when the file cannot be written.
pub async fn write_json(path: &Path, value: &Value) -> Result<(), Error> {
    let sink_error = |source| Error::Sink {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(sink_error)?;
    }
    tokio::fs::write(path, render(value)).await.map_err(sink_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_four_space_indent() {
        let rendered = render(&json!({"name": "Ada", "tags": ["math"]}));
        assert_eq!(
            rendered,
            "{\n    \"name\": \"Ada\",\n    \"tags\": [\n        \"math\"\n    ]\n}\n"
        );
    }

    #[test]
    fn test_render_keeps_non_ascii() {
        let rendered = render(&json!({"city": "Zürich"}));
        assert!(rendered.contains("Zürich"));
    }

    #[tokio::test]
    async fn test_write_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("output.json");
        write_json(&path, &json!({"a": 1})).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\n    \"a\": 1\n}\n");
        let reparsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed, json!({"a": 1}));
    }
}
