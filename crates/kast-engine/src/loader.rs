//! Module sources: reading a module directory and splitting its files into
//! documents.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngineError, SourceIssue};

/// File formats a module may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// YAML, possibly with several `---` separated documents.
    Yaml,
    /// A single JSON document.
    Json,
}

impl SourceFormat {
    /// Picks the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// One module file.
#[derive(Debug, Clone)]
pub struct Source {
    /// File name relative to the module directory.
    pub name: String,
    /// File content.
    pub content: String,
    /// How to parse the content.
    pub format: SourceFormat,
}

/// Reads every top-level module file of `dir`, sorted by name.
///
/// Hidden files and sub-directories are skipped.
///
/// # Errors
///
/// Returns `EngineError::Io` if the directory or a file cannot be read.
pub fn load_sources(dir: &Path) -> Result<Vec<Source>, EngineError> {
    let io_err = |path: PathBuf| move |source| EngineError::Io { path, source };
    let entries = std::fs::read_dir(dir).map_err(io_err(dir.to_path_buf()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err(dir.to_path_buf()))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        if let Some(format) = SourceFormat::from_path(&path) {
            files.push((entry.file_name().to_string_lossy().into_owned(), path, format));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut sources = Vec::with_capacity(files.len());
    for (name, path, format) in files {
        let content = std::fs::read_to_string(&path).map_err(io_err(path.clone()))?;
        tracing::debug!(file = %name, "loaded module source");
        sources.push(Source {
            name,
            content,
            format,
        });
    }
    Ok(sources)
}

/// A parsed document of a source file.
#[derive(Debug, Clone)]
pub struct Document {
    /// `file` for single-document files, `file#n` (1-based) otherwise.
    pub name: String,
    /// The decoded data.
    pub data: serde_json::Value,
}

/// Splits a source into its non-null documents.
///
/// # Errors
///
/// Returns every syntax problem found in the source.
pub fn parse_documents(source: &Source) -> Result<Vec<Document>, Vec<SourceIssue>> {
    let raw = match source.format {
        SourceFormat::Json => parse_json(source),
        SourceFormat::Yaml => parse_yaml(source),
    }?;

    let multiple = raw.len() > 1;
    let mut issues = Vec::new();
    let mut documents = Vec::new();
    for (i, data) in raw.into_iter().enumerate() {
        let name = if multiple {
            format!("{}#{}", source.name, i + 1)
        } else {
            source.name.clone()
        };
        match data {
            serde_json::Value::Null => {}
            serde_json::Value::Object(_) => documents.push(Document { name, data }),
            other => issues.push(SourceIssue {
                source: name,
                line: None,
                column: None,
                message: format!("document must be a mapping, found {}", json_type(&other)),
            }),
        }
    }
    if issues.is_empty() {
        Ok(documents)
    } else {
        Err(issues)
    }
}

const fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a mapping",
    }
}

fn parse_json(source: &Source) -> Result<Vec<serde_json::Value>, Vec<SourceIssue>> {
    serde_json::from_str(&source.content)
        .map(|doc| vec![doc])
        .map_err(|e| {
            vec![SourceIssue {
                source: source.name.clone(),
                line: (e.line() > 0).then_some(e.line()),
                column: (e.column() > 0).then_some(e.column()),
                message: e.to_string(),
            }]
        })
}

fn parse_yaml(source: &Source) -> Result<Vec<serde_json::Value>, Vec<SourceIssue>> {
    if source.content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut docs = Vec::new();
    let mut issues = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&source.content) {
        match serde_json::Value::deserialize(document) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                let location = e.location();
                issues.push(SourceIssue {
                    source: source.name.clone(),
                    line: location.as_ref().map(serde_yaml::Location::line),
                    column: location.as_ref().map(serde_yaml::Location::column),
                    message: e.to_string(),
                });
                break;
            }
        }
    }
    if issues.is_empty() {
        Ok(docs)
    } else {
        Err(issues)
    }
}
