//! Workflow engine: the main execution driver.
//!
//! [`WorkflowEngine::run`] walks a workflow's steps in declaration order. Each
//! step is resolved by the [`ParameterResolver`], dispatched to its slot in the
//! [`ExecutorTable`] and awaited before the next one starts. The first failing
//! step ends the run with a [`StepFailure`]; nothing that earlier steps did is
//! rolled back.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::core::config::EngineConfig;
use crate::core::environment::{creator_from_config, EnvironmentCreator, EnvironmentRegistry};
use crate::core::event_bus::{EngineEvent, EventEmitter, EventSender};
use crate::core::resolver::ParameterResolver;
use crate::core::workflow_resolver::{FileWorkflowResolver, WorkflowResolver};
use crate::domain::model::{Step, Workflow};
use crate::error::{StepError, StepFailure};
use crate::executors::{
    CommandExecutor, ExecutorTable, LinkExecutor, RemoveExecutor, StepContext,
    SubWorkflowExecutor,
};

pub struct WorkflowEngine {
    registry: Arc<EnvironmentRegistry>,
    executors: ExecutorTable,
    config: EngineConfig,
    emitter: EventEmitter,
}

impl WorkflowEngine {
    /// Start configuring an engine whose environments live under `root`.
    pub fn builder(root: impl Into<PathBuf>) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            root: root.into(),
            config: EngineConfig::default(),
            resolver: None,
            creator: None,
            events: None,
            command: None,
            sub_workflow: None,
            link: None,
            remove: None,
        }
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executors(&self) -> &ExecutorTable {
        &self.executors
    }

    /// Run a workflow with an empty argument bag.
    pub async fn run(&self, workflow: &Workflow) -> Result<(), StepFailure> {
        self.run_with_args(workflow, Map::new()).await
    }

    /// Run a workflow; `args` feeds `{{args.*}}` substitution.
    pub async fn run_with_args(
        &self,
        workflow: &Workflow,
        args: Map<String, Value>,
    ) -> Result<(), StepFailure> {
        self.run_nested(workflow, args, 0).await
    }

    /// Run a workflow at the given nesting depth. Used by sub-workflow
    /// executors; top-level callers want [`run`](Self::run).
    pub async fn run_nested(
        &self,
        workflow: &Workflow,
        args: Map<String, Value>,
        depth: usize,
    ) -> Result<(), StepFailure> {
        let run_id = Uuid::new_v4();
        tracing::info!(
            workflow = workflow.id(),
            %run_id,
            depth,
            steps = workflow.len(),
            "workflow started"
        );
        self.emitter.emit(EngineEvent::WorkflowStarted {
            run_id,
            workflow: workflow.id().to_string(),
            depth,
            steps: workflow.len(),
            timestamp: Utc::now(),
        });

        for (index, step) in workflow.steps().iter().enumerate() {
            let kind = step.kind();
            tracing::info!(workflow = workflow.id(), index, method = %kind, "step started");
            self.emitter.emit(EngineEvent::StepStarted {
                run_id,
                workflow: workflow.id().to_string(),
                index,
                kind,
                timestamp: Utc::now(),
            });

            let started = Instant::now();
            match self.execute_step(workflow, &args, index, step, depth).await {
                Ok(()) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(workflow = workflow.id(), index, elapsed_ms, "step succeeded");
                    self.emitter.emit(EngineEvent::StepSucceeded {
                        run_id,
                        workflow: workflow.id().to_string(),
                        index,
                        kind,
                        elapsed_ms,
                        timestamp: Utc::now(),
                    });
                }
                Err(source) => {
                    tracing::error!(
                        workflow = workflow.id(),
                        index,
                        method = %kind,
                        error = %source,
                        "step failed, aborting workflow"
                    );
                    self.emitter.emit(EngineEvent::StepFailed {
                        run_id,
                        workflow: workflow.id().to_string(),
                        index,
                        kind,
                        error: source.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.finish(run_id, workflow, depth, false);
                    return Err(StepFailure {
                        workflow: workflow.id().to_string(),
                        index,
                        step_kind: kind,
                        source,
                    });
                }
            }
        }

        self.finish(run_id, workflow, depth, true);
        Ok(())
    }

    async fn execute_step(
        &self,
        workflow: &Workflow,
        args: &Map<String, Value>,
        index: usize,
        step: &Step,
        depth: usize,
    ) -> Result<(), StepError> {
        let resolved = ParameterResolver::new(workflow.root(), self.registry.root(), args)
            .resolve(step)?;
        let ctx = StepContext {
            engine: self,
            workflow,
            index,
            depth,
        };
        self.executors.dispatch(&resolved, &ctx).await
    }

    fn finish(&self, run_id: Uuid, workflow: &Workflow, depth: usize, succeeded: bool) {
        tracing::info!(workflow = workflow.id(), %run_id, succeeded, "workflow finished");
        self.emitter.emit(EngineEvent::WorkflowFinished {
            run_id,
            workflow: workflow.id().to_string(),
            depth,
            succeeded,
            timestamp: Utc::now(),
        });
    }
}

/// Builder for configuring a [`WorkflowEngine`].
pub struct WorkflowEngineBuilder {
    root: PathBuf,
    config: EngineConfig,
    resolver: Option<Arc<dyn WorkflowResolver>>,
    creator: Option<Arc<dyn EnvironmentCreator>>,
    events: Option<EventSender>,
    command: Option<Arc<dyn CommandExecutor>>,
    sub_workflow: Option<Arc<dyn SubWorkflowExecutor>>,
    link: Option<Arc<dyn LinkExecutor>>,
    remove: Option<Arc<dyn RemoveExecutor>>,
}

impl WorkflowEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolver used by the built-in `script.start` executor. Defaults to
    /// [`FileWorkflowResolver`].
    pub fn resolver(mut self, resolver: Arc<dyn WorkflowResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Override the creator chosen by `config.environment`.
    pub fn environment_creator(mut self, creator: Arc<dyn EnvironmentCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Send [`EngineEvent`]s to this channel.
    pub fn events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn command_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.command = Some(executor);
        self
    }

    pub fn sub_workflow_executor(mut self, executor: Arc<dyn SubWorkflowExecutor>) -> Self {
        self.sub_workflow = Some(executor);
        self
    }

    pub fn link_executor(mut self, executor: Arc<dyn LinkExecutor>) -> Self {
        self.link = Some(executor);
        self
    }

    pub fn remove_executor(mut self, executor: Arc<dyn RemoveExecutor>) -> Self {
        self.remove = Some(executor);
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let creator = self
            .creator
            .unwrap_or_else(|| creator_from_config(&self.config.environment));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FileWorkflowResolver) as Arc<dyn WorkflowResolver>);

        let mut executors = ExecutorTable::builtin(&self.config, resolver);
        if let Some(command) = self.command {
            executors = executors.with_command(command);
        }
        if let Some(sub_workflow) = self.sub_workflow {
            executors = executors.with_sub_workflow(sub_workflow);
        }
        if let Some(link) = self.link {
            executors = executors.with_link(link);
        }
        if let Some(remove) = self.remove {
            executors = executors.with_remove(remove);
        }

        WorkflowEngine {
            registry: Arc::new(EnvironmentRegistry::new(&self.root, creator)),
            executors,
            config: self.config,
            emitter: self.events.map(EventEmitter::new).unwrap_or_default(),
        }
    }
}
