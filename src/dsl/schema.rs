use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ================================
// Workflow Manifest Schema
// ================================

/// Top-level manifest: `{ "run": [ { "method": ..., "params": {...} } ] }`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct WorkflowSchema {
    pub run: Vec<StepSchema>,
}

/// One raw step. `params` is validated per method by
/// [`step_from_schema`](super::step_from_schema).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StepSchema {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

// ================================
// Per-method params
// ================================

/// `message` accepts a single command or an ordered list of commands.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageParam {
    One(String),
    Many(Vec<String>),
}

impl MessageParam {
    pub fn into_commands(self) -> Vec<String> {
        match self {
            MessageParam::One(command) => vec![command],
            MessageParam::Many(commands) => commands,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ShellRunParams {
    #[serde(default)]
    pub venv: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub message: MessageParam,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ScriptStartParams {
    pub uri: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FsLinkParams {
    pub venv: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FsRmParams {
    pub path: String,
}
