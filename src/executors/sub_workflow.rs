//! `script.start`: resolve a workflow by URI and run it as a nested call.

use async_trait::async_trait;
use std::sync::Arc;

use super::{StepContext, SubWorkflowExecutor};
use crate::core::resolver::SubWorkflowCall;
use crate::core::workflow_resolver::WorkflowResolver;
use crate::error::StepError;

pub struct NestedWorkflowExecutor {
    resolver: Arc<dyn WorkflowResolver>,
}

impl NestedWorkflowExecutor {
    pub fn new(resolver: Arc<dyn WorkflowResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl SubWorkflowExecutor for NestedWorkflowExecutor {
    async fn start(&self, call: &SubWorkflowCall, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let max = ctx.engine.config().max_depth;
        if ctx.depth >= max {
            return Err(StepError::NestingTooDeep {
                uri: call.uri.clone(),
                max,
            });
        }

        let workflow = self.resolver.resolve(&call.uri, &call.base_dir).await?;
        tracing::info!(uri = %call.uri, workflow = workflow.id(), "starting sub-workflow");
        ctx.engine
            .run_nested(&workflow, call.params.clone(), ctx.depth + 1)
            .await
            .map_err(|cause| StepError::SubWorkflowFailed {
                uri: call.uri.clone(),
                cause: Box::new(cause),
            })
    }
}
