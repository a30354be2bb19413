//! Input file parsing.
//!
//! `.json` files must hold valid JSON; `.md` and `.txt` files are wrapped as
//! `{ "text": ... }`. Empty files are rejected.

use std::path::Path;

use crate::error::InputParseError;

use super::event::InputEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Markdown,
    Text,
}

impl InputFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, InputParseError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        Self::from_extension(extension).ok_or_else(|| InputParseError::UnsupportedExtension {
            path: path.display().to_string(),
            extension: extension.to_string(),
        })
    }
}

/// Task id encoded in an input file name (`<task_id>.<ext>`).
pub fn task_id_from_path(path: &Path) -> Result<String, InputParseError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .unwrap_or_default();

    if stem.is_empty() || stem.starts_with('.') {
        return Err(InputParseError::InvalidFileName(path.display().to_string()));
    }
    Ok(stem.to_string())
}

pub fn parse_payload(
    task_id: &str,
    format: InputFormat,
    raw: &str,
) -> Result<serde_json::Value, InputParseError> {
    if raw.trim().is_empty() {
        return Err(InputParseError::Empty {
            task_id: task_id.to_string(),
        });
    }

    match format {
        InputFormat::Json => {
            serde_json::from_str(raw).map_err(|e| InputParseError::MalformedJson {
                task_id: task_id.to_string(),
                message: e.to_string(),
            })
        }
        InputFormat::Markdown | InputFormat::Text => Ok(serde_json::json!({ "text": raw })),
    }
}

/// Read and parse one input file.
///
/// The task id comes from `task_id` when given, otherwise from the file name.
pub async fn parse_input_file(
    path: &Path,
    task_id: Option<&str>,
) -> Result<InputEvent, InputParseError> {
    let task_id = match task_id {
        Some(id) => id.to_string(),
        None => task_id_from_path(path)?,
    };
    let format = InputFormat::from_path(path)?;

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InputParseError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let payload = parse_payload(&task_id, format, &raw)?;
    Ok(InputEvent::new(task_id, payload).with_source(path))
}
