//! DSL parser: converts raw YAML/JSON/TOML text into [`WorkflowSchema`] and
//! loads workflow files from disk.

use std::path::{Path, PathBuf};

use super::schema::WorkflowSchema;
use super::validator::build_workflow;
use crate::domain::model::Workflow;
use crate::error::WorkflowError;

/// Supported DSL input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    /// YAML format (`.yaml` / `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
    /// TOML format (`.toml`).
    Toml,
}

impl DslFormat {
    /// Pick a format from the file extension. Anything unrecognised is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => DslFormat::Yaml,
            Some("toml") => DslFormat::Toml,
            _ => DslFormat::Json,
        }
    }
}

/// Parse DSL content into WorkflowSchema
pub fn parse_dsl(content: &str, format: DslFormat) -> Result<WorkflowSchema, WorkflowError> {
    match format {
        DslFormat::Yaml => serde_saphyr::from_str(content)
            .map_err(|e| WorkflowError::DslParseError(e.to_string())),
        DslFormat::Json => serde_json::from_str(content)
            .map_err(|e| WorkflowError::DslParseError(e.to_string())),
        DslFormat::Toml => {
            // Go through serde_json::Value so the untyped `params` maps keep
            // JSON semantics.
            let toml_val: toml::Value = toml::from_str(content)
                .map_err(|e| WorkflowError::DslParseError(e.to_string()))?;
            serde_json::from_value(toml_value_to_json(toml_val))
                .map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
    }
}

/// Parse and validate DSL content into a [`Workflow`].
pub fn parse_workflow(
    content: &str,
    format: DslFormat,
    id: impl Into<String>,
    root: impl Into<PathBuf>,
) -> Result<Workflow, WorkflowError> {
    let schema = parse_dsl(content, format)?;
    build_workflow(&schema, id, root)
}

/// Load a workflow file. The workflow id is the file stem and its root is the
/// containing directory.
pub async fn load_workflow(path: &Path) -> Result<Workflow, WorkflowError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("workflow")
        .to_string();
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    parse_workflow(&content, DslFormat::from_path(path), id, root)
}

/// Convert a [`toml::Value`] into a [`serde_json::Value`].
///
/// TOML has no null; datetimes are stringified.
fn toml_value_to_json(val: toml::Value) -> serde_json::Value {
    match val {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_value_to_json).collect())
        }
        toml::Value::Table(tbl) => serde_json::Value::Object(
            tbl.into_iter()
                .map(|(k, v)| (k, toml_value_to_json(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
    }
}
