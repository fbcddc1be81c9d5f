//! Validation of raw manifest steps into the typed [`Step`] model.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::PathBuf;

use super::schema::{
    FsLinkParams, FsRmParams, ScriptStartParams, ShellRunParams, StepSchema, WorkflowSchema,
};
use crate::domain::model::{
    LinkPath, RemovePath, RunCommand, StartSubWorkflow, Step, StepKind, Workflow,
};
use crate::error::WorkflowError;

/// Validate every step of a parsed schema and build a [`Workflow`].
pub fn build_workflow(
    schema: &WorkflowSchema,
    id: impl Into<String>,
    root: impl Into<PathBuf>,
) -> Result<Workflow, WorkflowError> {
    let steps = schema
        .run
        .iter()
        .enumerate()
        .map(|(index, raw)| step_from_schema(index, raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Workflow::new(id, root, steps))
}

/// Convert a single raw step, checking the params its method requires.
pub fn step_from_schema(index: usize, raw: &StepSchema) -> Result<Step, WorkflowError> {
    let kind = StepKind::from_method(&raw.method).ok_or_else(|| WorkflowError::UnknownMethod {
        index,
        method: raw.method.clone(),
    })?;
    let invalid = |reason: String| WorkflowError::InvalidParams {
        index,
        method: raw.method.clone(),
        reason,
    };

    match kind {
        StepKind::RunCommand => {
            let params: ShellRunParams = decode(&raw.params).map_err(invalid)?;
            let message = params.message.into_commands();
            if message.is_empty() {
                return Err(invalid("`message` must name at least one command".into()));
            }
            Ok(Step::RunCommand(RunCommand {
                venv: params.venv,
                path: params.path,
                message,
            }))
        }
        StepKind::StartSubWorkflow => {
            let params: ScriptStartParams = decode(&raw.params).map_err(invalid)?;
            if params.uri.trim().is_empty() {
                return Err(invalid("`uri` must not be empty".into()));
            }
            Ok(Step::StartSubWorkflow(StartSubWorkflow {
                uri: params.uri,
                params: params.params,
            }))
        }
        StepKind::LinkPath => {
            let params: FsLinkParams = decode(&raw.params).map_err(invalid)?;
            if params.venv.trim().is_empty() {
                return Err(invalid("`venv` must not be empty".into()));
            }
            Ok(Step::LinkPath(LinkPath { venv: params.venv }))
        }
        StepKind::RemovePath => {
            let params: FsRmParams = decode(&raw.params).map_err(invalid)?;
            if params.path.trim().is_empty() {
                return Err(invalid("`path` must not be empty".into()));
            }
            Ok(Step::RemovePath(RemovePath { path: params.path }))
        }
    }
}

/// Render a workflow back into manifest form.
pub fn schema_from_workflow(workflow: &Workflow) -> WorkflowSchema {
    WorkflowSchema {
        run: workflow.steps().iter().map(schema_from_step).collect(),
    }
}

fn schema_from_step(step: &Step) -> StepSchema {
    let params = match step {
        Step::RunCommand(cmd) => {
            let mut params = Map::new();
            if let Some(venv) = &cmd.venv {
                params.insert("venv".into(), Value::String(venv.clone()));
            }
            if let Some(path) = &cmd.path {
                params.insert("path".into(), Value::String(path.clone()));
            }
            params.insert(
                "message".into(),
                Value::Array(cmd.message.iter().cloned().map(Value::String).collect()),
            );
            Value::Object(params)
        }
        Step::StartSubWorkflow(call) => serde_json::json!({
            "uri": call.uri,
            "params": call.params,
        }),
        Step::LinkPath(link) => serde_json::json!({ "venv": link.venv }),
        Step::RemovePath(rm) => serde_json::json!({ "path": rm.path }),
    };
    StepSchema {
        method: step.kind().method().to_string(),
        params,
    }
}

fn decode<T: DeserializeOwned>(params: &Value) -> Result<T, String> {
    if !params.is_object() {
        return Err("`params` must be an object".into());
    }
    serde_json::from_value(params.clone()).map_err(|e| e.to_string())
}
