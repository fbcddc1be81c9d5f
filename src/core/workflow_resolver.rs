//! Sub-workflow resolution.
//!
//! `script.start` names its target by an opaque URI. The [`WorkflowResolver`]
//! trait turns that URI into a [`Workflow`] so that tests and embedders can
//! substitute their own lookup.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::model::Workflow;
use crate::dsl::load_workflow;
use crate::error::{StepError, WorkflowError};

#[async_trait]
pub trait WorkflowResolver: Send + Sync {
    /// Resolve `uri` relative to the calling workflow's root.
    async fn resolve(&self, uri: &str, base_dir: &Path) -> Result<Workflow, StepError>;
}

/// Resolves URIs to workflow files on disk. A `file://` prefix is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileWorkflowResolver;

#[async_trait]
impl WorkflowResolver for FileWorkflowResolver {
    async fn resolve(&self, uri: &str, base_dir: &Path) -> Result<Workflow, StepError> {
        let relative = uri.strip_prefix("file://").unwrap_or(uri);
        let path = base_dir.join(relative);
        load_workflow(&path).await.map_err(|e| {
            let reason = match e {
                WorkflowError::Io { source, .. } => source.to_string(),
                other => other.to_string(),
            };
            StepError::ResolutionFailed {
                uri: uri.to_string(),
                reason,
            }
        })
    }
}

/// In-memory URI → workflow table.
#[derive(Default)]
pub struct StaticWorkflowResolver {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl StaticWorkflowResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, uri: impl Into<String>, workflow: Workflow) -> Self {
        self.register(uri, workflow);
        self
    }

    pub fn register(&self, uri: impl Into<String>, workflow: Workflow) {
        self.workflows.write().insert(uri.into(), workflow);
    }
}

#[async_trait]
impl WorkflowResolver for StaticWorkflowResolver {
    async fn resolve(&self, uri: &str, _base_dir: &Path) -> Result<Workflow, StepError> {
        self.workflows
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| StepError::ResolutionFailed {
                uri: uri.to_string(),
                reason: "no workflow registered under this uri".into(),
            })
    }
}
