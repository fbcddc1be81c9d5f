//! Parameter resolution.
//!
//! Turns a declared [`Step`] into a [`ResolvedStep`] with absolute paths and
//! canonical environment names:
//!
//! - `{{args.key}}` (or `{{args.a.b}}`) in any string param is replaced by the
//!   corresponding value of the run's argument bag.
//! - `path` resolves against the workflow root; absent means the root itself.
//! - `venv` resolves against the step's working directory, so `../env` from
//!   `repo/` and `env` from the root name the same environment.
//! - `script.start` params are forwarded untouched.

use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::paths::{absolutize, normalize_path};
use crate::domain::model::Step;
use crate::error::StepError;

/// A `shell.run` step ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub environment: Option<String>,
    pub cwd: PathBuf,
    pub commands: Vec<String>,
}

/// A `script.start` step ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct SubWorkflowCall {
    pub uri: String,
    /// Directory the URI is resolved against.
    pub base_dir: PathBuf,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveRequest {
    pub path: PathBuf,
}

/// A step with every parameter resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedStep {
    RunCommand(CommandInvocation),
    StartSubWorkflow(SubWorkflowCall),
    LinkPath(LinkRequest),
    RemovePath(RemoveRequest),
}

fn args_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*args\.([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
            .expect("args pattern is a valid regex")
    })
}

pub struct ParameterResolver<'a> {
    workflow_root: PathBuf,
    environment_root: &'a Path,
    args: &'a Map<String, Value>,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(
        workflow_root: &Path,
        environment_root: &'a Path,
        args: &'a Map<String, Value>,
    ) -> Self {
        Self {
            workflow_root: absolutize(workflow_root),
            environment_root,
            args,
        }
    }

    pub fn resolve(&self, step: &Step) -> Result<ResolvedStep, StepError> {
        match step {
            Step::RunCommand(cmd) => {
                let cwd = self.working_dir(cmd.path.as_deref())?;
                let environment = cmd
                    .venv
                    .as_deref()
                    .map(|venv| self.environment_name(venv, &cwd))
                    .transpose()?;
                let commands = cmd
                    .message
                    .iter()
                    .map(|command| self.substitute(command))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvedStep::RunCommand(CommandInvocation {
                    environment,
                    cwd,
                    commands,
                }))
            }
            Step::StartSubWorkflow(call) => Ok(ResolvedStep::StartSubWorkflow(SubWorkflowCall {
                uri: self.substitute(&call.uri)?,
                base_dir: self.workflow_root.clone(),
                params: call.params.clone(),
            })),
            Step::LinkPath(link) => Ok(ResolvedStep::LinkPath(LinkRequest {
                environment: self.environment_name(&link.venv, &self.workflow_root)?,
            })),
            Step::RemovePath(rm) => Ok(ResolvedStep::RemovePath(RemoveRequest {
                path: self.path(&rm.path)?,
            })),
        }
    }

    /// Replace every `{{args.*}}` reference in `text`.
    pub fn substitute(&self, text: &str) -> Result<String, StepError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in args_pattern().captures_iter(text) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = lookup(self.args, key.as_str()).ok_or_else(|| {
                StepError::UnresolvedParameter {
                    name: format!("args.{}", key.as_str()),
                }
            })?;
            out.push_str(&text[last..whole.start()]);
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Resolve a path param against the workflow root.
    pub fn path(&self, raw: &str) -> Result<PathBuf, StepError> {
        let substituted = self.substitute(raw)?;
        Ok(normalize_path(&self.workflow_root.join(substituted)))
    }

    pub fn working_dir(&self, raw: Option<&str>) -> Result<PathBuf, StepError> {
        match raw {
            Some(raw) => self.path(raw),
            None => Ok(self.workflow_root.clone()),
        }
    }

    /// Canonical registry name for a `venv` reference seen from `cwd`.
    pub fn environment_name(&self, venv: &str, cwd: &Path) -> Result<String, StepError> {
        let substituted = self.substitute(venv)?;
        let full = normalize_path(&cwd.join(&substituted));
        let relative = full
            .strip_prefix(self.environment_root)
            .map_err(|_| StepError::EnvironmentFailed {
                name: substituted.clone(),
                cause: format!(
                    "resolves to {} outside the environment root {}",
                    full.display(),
                    self.environment_root.display()
                ),
            })?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if name.is_empty() {
            return Err(StepError::EnvironmentFailed {
                name: substituted,
                cause: "names the environment root itself".into(),
            });
        }
        Ok(name)
    }
}

fn lookup<'v>(args: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
    let mut parts = key.split('.');
    let mut current = args.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{RunCommand, StartSubWorkflow};
    use serde_json::json;

    const ROOT: &str = "/apps/demo";

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_substitute_args() {
        let bag = args(json!({"venv": "env", "cuda": {"version": 12}, "xformers": true}));
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);
        assert_eq!(
            resolver
                .substitute("install into {{args.venv}} cu{{ args.cuda.version }} x={{args.xformers}}")
                .unwrap(),
            "install into env cu12 x=true"
        );
        assert_eq!(resolver.substitute("no templates").unwrap(), "no templates");
    }

    #[test]
    fn test_substitute_missing_arg() {
        let bag = Map::new();
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);
        let err = resolver.substitute("{{args.venv}}").unwrap_err();
        assert!(matches!(err, StepError::UnresolvedParameter { name } if name == "args.venv"));
    }

    #[test]
    fn test_relative_venv_names_same_environment() {
        let bag = Map::new();
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);

        let from_root = resolver
            .resolve(&RunCommand::new(["pip list"]).in_venv("env").into())
            .unwrap();
        let from_repo = resolver
            .resolve(&RunCommand::new(["pip install ."]).at("repo").in_venv("../env").into())
            .unwrap();

        match (from_root, from_repo) {
            (ResolvedStep::RunCommand(a), ResolvedStep::RunCommand(b)) => {
                assert_eq!(a.environment.as_deref(), Some("env"));
                assert_eq!(b.environment.as_deref(), Some("env"));
                assert_eq!(a.cwd, PathBuf::from(ROOT));
                assert_eq!(b.cwd, PathBuf::from("/apps/demo/repo"));
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_venv_outside_root_is_rejected() {
        let bag = Map::new();
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);
        let err = resolver
            .resolve(&RunCommand::new(["true"]).in_venv("../../elsewhere").into())
            .unwrap_err();
        assert!(matches!(err, StepError::EnvironmentFailed { .. }));

        let err = resolver.resolve(&Step::link(".")).unwrap_err();
        assert!(matches!(err, StepError::EnvironmentFailed { .. }));
    }

    #[test]
    fn test_remove_and_link_resolution() {
        let bag = args(json!({"venv": "env"}));
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);
        assert_eq!(
            resolver.resolve(&Step::remove("{{args.venv}}")).unwrap(),
            ResolvedStep::RemovePath(RemoveRequest {
                path: PathBuf::from("/apps/demo/env")
            })
        );
        assert_eq!(
            resolver.resolve(&Step::link("{{args.venv}}")).unwrap(),
            ResolvedStep::LinkPath(LinkRequest {
                environment: "env".into()
            })
        );
    }

    #[test]
    fn test_sub_workflow_params_are_forwarded_untouched() {
        let bag = Map::new();
        let resolver = ParameterResolver::new(Path::new(ROOT), Path::new(ROOT), &bag);
        let step: Step = StartSubWorkflow::new("torch.js")
            .param("venv", "{{args.venv}}")
            .into();
        match resolver.resolve(&step).unwrap() {
            ResolvedStep::StartSubWorkflow(call) => {
                assert_eq!(call.base_dir, PathBuf::from(ROOT));
                assert_eq!(call.params["venv"], json!("{{args.venv}}"));
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }
}
