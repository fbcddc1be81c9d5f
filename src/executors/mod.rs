//! Step executors.
//!
//! Each [`StepKind`](crate::domain::model::StepKind) has exactly one executor
//! slot in the [`ExecutorTable`]. The table is closed: dispatch is a `match`
//! over [`ResolvedStep`], and the slots only exist so tests and embedders can
//! swap an implementation (for instance an instrumented stub).

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::EngineConfig;
use crate::core::engine::WorkflowEngine;
use crate::core::environment::EnvironmentRegistry;
use crate::core::resolver::{
    CommandInvocation, LinkRequest, RemoveRequest, ResolvedStep, SubWorkflowCall,
};
use crate::core::workflow_resolver::WorkflowResolver;
use crate::domain::model::Workflow;
use crate::error::StepError;

pub mod command;
pub mod link;
pub mod remove;
pub mod sub_workflow;

pub use command::ShellCommandExecutor;
pub use link::{ensure_link, LinkOutcome, SymlinkExecutor};
pub use remove::FsRemoveExecutor;
pub use sub_workflow::NestedWorkflowExecutor;

/// What an executor may see of the run it belongs to.
pub struct StepContext<'a> {
    pub engine: &'a WorkflowEngine,
    pub workflow: &'a Workflow,
    pub index: usize,
    /// Nesting depth; 0 for a top-level run.
    pub depth: usize,
}

impl StepContext<'_> {
    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        self.engine.registry()
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run_commands(
        &self,
        invocation: &CommandInvocation,
        ctx: &StepContext<'_>,
    ) -> Result<(), StepError>;
}

#[async_trait]
pub trait SubWorkflowExecutor: Send + Sync {
    async fn start(&self, call: &SubWorkflowCall, ctx: &StepContext<'_>) -> Result<(), StepError>;
}

#[async_trait]
pub trait LinkExecutor: Send + Sync {
    async fn link(&self, request: &LinkRequest, ctx: &StepContext<'_>) -> Result<(), StepError>;
}

#[async_trait]
pub trait RemoveExecutor: Send + Sync {
    async fn remove(&self, request: &RemoveRequest, ctx: &StepContext<'_>)
        -> Result<(), StepError>;
}

/// One executor per step kind.
#[derive(Clone)]
pub struct ExecutorTable {
    pub command: Arc<dyn CommandExecutor>,
    pub sub_workflow: Arc<dyn SubWorkflowExecutor>,
    pub link: Arc<dyn LinkExecutor>,
    pub remove: Arc<dyn RemoveExecutor>,
}

impl ExecutorTable {
    /// The real executors: shell subprocesses, nested runs through `resolver`,
    /// symlinks and recursive deletion.
    pub fn builtin(config: &EngineConfig, resolver: Arc<dyn WorkflowResolver>) -> Self {
        Self {
            command: Arc::new(ShellCommandExecutor::new(
                config.shell.clone(),
                config.stream_output,
            )),
            sub_workflow: Arc::new(NestedWorkflowExecutor::new(resolver)),
            link: Arc::new(SymlinkExecutor::new(config.link_dir.clone())),
            remove: Arc::new(FsRemoveExecutor),
        }
    }

    pub fn with_command(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.command = executor;
        self
    }

    pub fn with_sub_workflow(mut self, executor: Arc<dyn SubWorkflowExecutor>) -> Self {
        self.sub_workflow = executor;
        self
    }

    pub fn with_link(mut self, executor: Arc<dyn LinkExecutor>) -> Self {
        self.link = executor;
        self
    }

    pub fn with_remove(mut self, executor: Arc<dyn RemoveExecutor>) -> Self {
        self.remove = executor;
        self
    }

    pub async fn dispatch(
        &self,
        step: &ResolvedStep,
        ctx: &StepContext<'_>,
    ) -> Result<(), StepError> {
        match step {
            ResolvedStep::RunCommand(invocation) => {
                self.command.run_commands(invocation, ctx).await
            }
            ResolvedStep::StartSubWorkflow(call) => self.sub_workflow.start(call, ctx).await,
            ResolvedStep::LinkPath(request) => self.link.link(request, ctx).await,
            ResolvedStep::RemovePath(request) => self.remove.remove(request, ctx).await,
        }
    }
}
