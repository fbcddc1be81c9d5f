//! # envflow: declarative environment provisioning
//!
//! `envflow` runs workflows: ordered lists of declarative steps that set up and
//! maintain an isolated tool environment on disk. A workflow is either loaded
//! from a JSON/YAML/TOML manifest or taken from the built-in [`catalog`].
//!
//! - **Steps**: `shell.run` (commands, optionally inside an environment),
//!   `script.start` (nested workflow), `fs.link` (expose an environment) and
//!   `fs.rm` (idempotent delete).
//! - **Fail-fast**: steps run strictly in order; the first failure aborts the
//!   run and is reported as a [`StepFailure`]. Nothing is rolled back.
//! - **Scoped activation**: environment variables are applied to the spawned
//!   subprocess only, for the duration of one step.
//! - **Pluggable executors**: each step kind dispatches to a trait object that
//!   can be replaced through [`WorkflowEngineBuilder`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use envflow::{load_workflow, WorkflowEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let workflow = load_workflow("install.json".as_ref()).await?;
//!     let engine = WorkflowEngine::builder("/apps/audio").build();
//!     engine.run(&workflow).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod core;
pub mod domain;
pub mod dsl;
pub mod error;
pub mod executors;

pub use crate::catalog::{CatalogConfig, UpdateState, WorkflowCatalog};
pub use crate::core::{
    create_event_channel, EngineConfig, EngineEvent, EnvironmentRegistry, Settings,
    StaticWorkflowResolver, WorkflowEngine, WorkflowEngineBuilder, WorkflowResolver,
};
pub use crate::domain::model::{
    LinkPath, RemovePath, RunCommand, StartSubWorkflow, Step, StepKind, Workflow,
};
pub use crate::dsl::{load_workflow, parse_dsl, parse_workflow, DslFormat, WorkflowSchema};
pub use crate::error::{StepError, StepFailure, WorkflowError};
pub use crate::executors::{
    CommandExecutor, ExecutorTable, LinkExecutor, RemoveExecutor, StepContext,
    SubWorkflowExecutor,
};
