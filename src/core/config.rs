//! Engine and application configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::CatalogConfig;
use crate::error::WorkflowError;

/// Default maximum sub-workflow nesting.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Directory under the environment root that holds host-visible links.
pub const DEFAULT_LINK_DIR: &str = ".links";

/// Configuration for the workflow engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum depth of nested `script.start` calls.
    pub max_depth: usize,
    /// Echo subprocess output to the console while it runs.
    pub stream_output: bool,
    pub shell: ShellConfig,
    pub environment: EnvironmentConfig,
    /// Where `fs.link` places links. Defaults to `<root>/.links`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            stream_output: true,
            shell: ShellConfig::default(),
            environment: EnvironmentConfig::default(),
            link_dir: None,
        }
    }
}

/// Shell used to interpret each command string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            ShellConfig {
                program: "cmd".into(),
                args: vec!["/C".into()],
            }
        } else {
            ShellConfig {
                program: "sh".into(),
                args: vec!["-c".into()],
            }
        }
    }
}

/// How missing environments are created on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatorKind {
    /// `<python> -m venv <root>`
    Venv,
    /// Plain directory with an empty binaries folder.
    Directory,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub creator: CreatorKind,
    /// Interpreter used by the `venv` creator.
    pub python: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            creator: CreatorKind::Venv,
            python: if cfg!(windows) { "python" } else { "python3" }.into(),
        }
    }
}

/// Full application settings: `[engine]` and `[catalog]` tables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub catalog: CatalogConfig,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, WorkflowError> {
        toml::from_str(content).map_err(|e| WorkflowError::ConfigError(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkflowError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }
}
