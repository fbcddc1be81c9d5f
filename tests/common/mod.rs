#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use envflow::core::environment::DirectoryCreator;
use envflow::core::resolver::{CommandInvocation, SubWorkflowCall};
use envflow::core::EngineConfig;
use envflow::{
    CommandExecutor, StepContext, StepError, StepKind, SubWorkflowExecutor, WorkflowEngine,
    WorkflowEngineBuilder,
};

/// One executor call as seen by the instrumented executors.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub index: usize,
    pub kind: StepKind,
    pub environment: Option<String>,
    pub cwd: Option<PathBuf>,
    pub commands: Vec<String>,
    pub uri: Option<String>,
}

/// Shared call log for every instrumented executor of one engine.
#[derive(Default, Clone)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|c| c.index).collect()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    fn push(&self, invocation: Invocation) {
        self.calls.lock().push(invocation);
    }
}

/// Records each command instead of spawning it. Environments are still
/// created through the registry so later steps see them on disk.
pub struct RecordingCommands {
    log: CallLog,
    fail_on: Option<String>,
}

impl RecordingCommands {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail_on: None }
    }

    /// Fail with exit code 1 when this exact command comes up.
    pub fn failing_on(log: CallLog, command: impl Into<String>) -> Self {
        Self {
            log,
            fail_on: Some(command.into()),
        }
    }
}

#[async_trait]
impl CommandExecutor for RecordingCommands {
    async fn run_commands(
        &self,
        invocation: &CommandInvocation,
        ctx: &StepContext<'_>,
    ) -> Result<(), StepError> {
        if let Some(name) = &invocation.environment {
            ctx.registry().ensure(name).await?;
        }
        let mut executed = Vec::new();
        let mut outcome = Ok(());
        for command in &invocation.commands {
            executed.push(command.clone());
            if self.fail_on.as_deref() == Some(command.as_str()) {
                outcome = Err(StepError::CommandFailed {
                    command: command.clone(),
                    exit_code: Some(1),
                });
                break;
            }
        }
        self.log.push(Invocation {
            index: ctx.index,
            kind: StepKind::RunCommand,
            environment: invocation.environment.clone(),
            cwd: Some(invocation.cwd.clone()),
            commands: executed,
            uri: None,
        });
        outcome
    }
}

/// Records sub-workflow starts without running anything.
pub struct RecordingSubWorkflows {
    log: CallLog,
}

impl RecordingSubWorkflows {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl SubWorkflowExecutor for RecordingSubWorkflows {
    async fn start(&self, call: &SubWorkflowCall, ctx: &StepContext<'_>) -> Result<(), StepError> {
        self.log.push(Invocation {
            index: ctx.index,
            kind: StepKind::StartSubWorkflow,
            environment: None,
            cwd: None,
            commands: Vec::new(),
            uri: Some(call.uri.clone()),
        });
        Ok(())
    }
}

/// Engine builder rooted at `root` with bare-directory environments.
pub fn builder(root: &Path) -> WorkflowEngineBuilder {
    WorkflowEngine::builder(root).environment_creator(Arc::new(DirectoryCreator))
}

/// Engine whose commands and sub-workflows are recorded; links and removals
/// are real.
pub fn recording_engine(root: &Path, commands: RecordingCommands, log: &CallLog) -> WorkflowEngine {
    builder(root)
        .config(EngineConfig {
            stream_output: false,
            ..EngineConfig::default()
        })
        .command_executor(Arc::new(commands))
        .sub_workflow_executor(Arc::new(RecordingSubWorkflows::new(log.clone())))
        .build()
}

/// Canonical temp root, so registry paths compare equal on macOS too.
pub fn canonical_root(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().canonicalize().expect("temp dir should canonicalize")
}
