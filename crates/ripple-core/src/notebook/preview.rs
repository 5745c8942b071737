//! Lightweight output previews for tool-call drivers.
//!
//! Summarizes a cell's outputs without shipping full payloads: a short text
//! derived from the first output, a coarse type tag, and an image flag.

use serde::{Deserialize, Serialize};

use super::{mime, Output};

/// Maximum characters of a text preview before truncation.
const TEXT_PREVIEW_LIMIT: usize = 500;

/// Preview of a cell's outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    pub has_image: bool,
}

/// Summarize `outputs` per the preview rules.
pub fn preview_outputs(outputs: &[Output]) -> OutputPreview {
    let has_image = outputs.iter().any(|o| o.mime_type.starts_with("image/"));
    let Some(first) = outputs.first() else {
        return OutputPreview {
            has_image,
            ..OutputPreview::default()
        };
    };

    if first.mime_type.starts_with("image/") {
        let kind = first.mime_type.split('/').nth(1).unwrap_or("image");
        return OutputPreview {
            output_preview: Some(format!("[{kind} chart]")),
            output_type: Some("image".to_string()),
            columns: None,
            has_image,
        };
    }

    if first.mime_type == mime::DATAFRAME {
        let columns: Vec<String> = first
            .data
            .get("columns")
            .and_then(|v| v.as_array())
            .map(|cols| {
                cols.iter()
                    .map(|c| c.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = first
            .data
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|r| r.len())
            .unwrap_or(0);
        return OutputPreview {
            output_preview: Some(format!("[{rows}×{} table]", columns.len())),
            output_type: Some("dataframe".to_string()),
            columns: Some(columns),
            has_image,
        };
    }

    let (text, tag) = match first.mime_type.as_str() {
        mime::JSON => (first.data.to_string(), "json"),
        _ => (
            first
                .data
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| first.data.to_string()),
            "text",
        ),
    };
    OutputPreview {
        output_preview: Some(truncate(&text, TEXT_PREVIEW_LIMIT)),
        output_type: Some(tag.to_string()),
        columns: None,
        has_image,
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push('…');
    out
}
