//! Run-time step errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::model::StepKind;

/// Errors reported by step executors.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("command `{command}` failed ({})", exit_label(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },
    #[error("command `{command}` could not be started: {cause}")]
    SpawnFailed { command: String, cause: String },
    #[error("sub-workflow `{uri}` failed")]
    SubWorkflowFailed {
        uri: String,
        #[source]
        cause: Box<StepFailure>,
    },
    #[error("sub-workflow `{uri}` could not be resolved: {reason}")]
    ResolutionFailed { uri: String, reason: String },
    #[error("sub-workflow `{uri}` exceeds the maximum nesting depth of {max}")]
    NestingTooDeep { uri: String, max: usize },
    #[error("linking `{}` failed: {cause}", .target.display())]
    LinkFailed { target: PathBuf, cause: String },
    #[error("removing `{}` failed: {cause}", .path.display())]
    RemoveFailed { path: PathBuf, cause: String },
    #[error("environment `{name}` could not be prepared: {cause}")]
    EnvironmentFailed { name: String, cause: String },
    #[error("environment `{name}` is in use by a running step")]
    EnvironmentBusy { name: String },
    #[error("unresolved parameter `{name}`")]
    UnresolvedParameter { name: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// A step error together with the step that produced it.
#[derive(Debug, Error)]
#[error("step {index} ({step_kind}) of workflow `{workflow}` failed")]
pub struct StepFailure {
    pub workflow: String,
    pub index: usize,
    pub step_kind: StepKind,
    #[source]
    pub source: StepError,
}

impl StepFailure {
    /// Follow nested sub-workflow failures down to the innermost failing step.
    pub fn innermost(&self) -> &StepFailure {
        let mut current = self;
        while let StepError::SubWorkflowFailed { cause, .. } = &current.source {
            current = cause;
        }
        current
    }

    /// The innermost step error, e.g. the command that actually failed inside
    /// a delegated sub-workflow.
    pub fn root_cause(&self) -> &StepError {
        &self.innermost().source
    }
}
