use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminant of a [`Step`], one per executor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    RunCommand,
    StartSubWorkflow,
    LinkPath,
    RemovePath,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [
        StepKind::RunCommand,
        StepKind::StartSubWorkflow,
        StepKind::LinkPath,
        StepKind::RemovePath,
    ];

    /// The manifest `method` string for this kind.
    pub fn method(&self) -> &'static str {
        match self {
            StepKind::RunCommand => "shell.run",
            StepKind::StartSubWorkflow => "script.start",
            StepKind::LinkPath => "fs.link",
            StepKind::RemovePath => "fs.rm",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.method() == method)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Run one or more shell commands, optionally inside a named environment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunCommand {
    /// Environment name, relative to the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv: Option<String>,
    /// Working directory, relative to the workflow root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: Vec<String>,
}

impl RunCommand {
    pub fn new<I, S>(message: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            venv: None,
            path: None,
            message: message.into_iter().map(Into::into).collect(),
        }
    }

    pub fn in_venv(mut self, venv: impl Into<String>) -> Self {
        self.venv = Some(venv.into());
        self
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Delegate to another workflow definition referenced by URI.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StartSubWorkflow {
    pub uri: String,
    /// Forwarded untouched; the sub-workflow sees it as `args`.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl StartSubWorkflow {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Expose an environment at the host-visible link location.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinkPath {
    pub venv: String,
}

/// Delete a path; an absent path is not an error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemovePath {
    pub path: String,
}

/// One declarative operation in a workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    RunCommand(RunCommand),
    StartSubWorkflow(StartSubWorkflow),
    LinkPath(LinkPath),
    RemovePath(RemovePath),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::RunCommand(_) => StepKind::RunCommand,
            Step::StartSubWorkflow(_) => StepKind::StartSubWorkflow,
            Step::LinkPath(_) => StepKind::LinkPath,
            Step::RemovePath(_) => StepKind::RemovePath,
        }
    }

    pub fn link(venv: impl Into<String>) -> Self {
        Step::LinkPath(LinkPath { venv: venv.into() })
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Step::RemovePath(RemovePath { path: path.into() })
    }
}

impl From<RunCommand> for Step {
    fn from(value: RunCommand) -> Self {
        Step::RunCommand(value)
    }
}

impl From<StartSubWorkflow> for Step {
    fn from(value: StartSubWorkflow) -> Self {
        Step::StartSubWorkflow(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        for kind in StepKind::ALL {
            assert_eq!(StepKind::from_method(kind.method()), Some(kind));
        }
        assert_eq!(StepKind::from_method("fs.copy"), None);
    }

    #[test]
    fn test_step_kind() {
        let shell: Step = RunCommand::new(["git pull"]).at("repo").into();
        assert_eq!(shell.kind(), StepKind::RunCommand);
        assert_eq!(Step::link("env").kind(), StepKind::LinkPath);
        assert_eq!(Step::remove("env").kind(), StepKind::RemovePath);
        let script: Step = StartSubWorkflow::new("torch.js").param("venv", "env").into();
        assert_eq!(script.kind(), StepKind::StartSubWorkflow);
    }

    #[test]
    fn test_run_command_builder() {
        let cmd = RunCommand::new(["pip install ."]).at("repo").in_venv("../env");
        assert_eq!(cmd.path.as_deref(), Some("repo"));
        assert_eq!(cmd.venv.as_deref(), Some("../env"));
        assert_eq!(cmd.message, vec!["pip install .".to_string()]);
    }
}
