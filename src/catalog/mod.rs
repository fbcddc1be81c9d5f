//! Built-in provisioning workflows.
//!
//! `install` sets up the toolkit environment from scratch; `update` pulls new
//! sources and rebuilds the environment from nothing. Both end with the
//! backend sub-workflow and the host link, so they converge on the same state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

use crate::domain::model::{RunCommand, StartSubWorkflow, Step, Workflow};
use crate::error::WorkflowError;

mod state;

pub use state::UpdateState;

pub const INSTALL: &str = "install";
pub const UPDATE: &str = "update";

/// Names of the workflows the catalog provides.
pub const WORKFLOW_NAMES: [&str; 2] = [INSTALL, UPDATE];

/// Commands that drop the generic numerical backend before the pinned one is
/// installed. `-y` keeps them harmless when the packages are absent.
const PURGE_GENERIC_BACKEND: &str = "pip uninstall -y torch torchaudio torchvision";
const INSTALL_REQUIREMENTS: &str = "uv pip install -r requirements.txt";
const UPGRADE_QUANTIZATION: &str = "uv pip install -U bitsandbytes";
const INSTALL_TOOLKIT: &str = "pip install .";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Environment name, relative to the application root.
    pub env: String,
    pub repo_url: String,
    /// Checkout directory, relative to the application root.
    pub repo_dir: String,
    /// URI of the backend-selection sub-workflow.
    pub backend_uri: String,
    /// Extra params forwarded to the backend sub-workflow next to `venv`.
    pub backend_params: Map<String, Value>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            env: "env".into(),
            repo_url: "https://github.com/Stability-AI/stable-audio-tools.git".into(),
            repo_dir: "stable-audio-tools".into(),
            backend_uri: "torch.js".into(),
            backend_params: Map::new(),
        }
    }
}

pub struct WorkflowCatalog {
    root: PathBuf,
    config: CatalogConfig,
}

impl WorkflowCatalog {
    pub fn new(root: impl Into<PathBuf>, config: CatalogConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn get(&self, name: &str) -> Result<Workflow, WorkflowError> {
        match name {
            INSTALL => Ok(self.install()),
            UPDATE => Ok(self.update()),
            other => Err(WorkflowError::UnknownWorkflow(other.to_string())),
        }
    }

    /// clone → install toolkit → swap in pinned backend packages → backend
    /// sub-workflow → link.
    pub fn install(&self) -> Workflow {
        let cfg = &self.config;
        let steps = vec![
            RunCommand::new([
                "git config --global --add safe.directory '*'".to_string(),
                format!("git clone {} {}", cfg.repo_url, cfg.repo_dir),
            ])
            .in_venv(&cfg.env)
            .into(),
            self.install_toolkit(),
            RunCommand::new([PURGE_GENERIC_BACKEND, INSTALL_REQUIREMENTS, UPGRADE_QUANTIZATION])
                .in_venv(&cfg.env)
                .into(),
            self.backend(),
            Step::link(&cfg.env),
        ];
        Workflow::new(INSTALL, &self.root, steps)
    }

    /// Pull both checkouts, delete the environment and rebuild it from
    /// scratch. See [`UpdateState`] for the phases.
    pub fn update(&self) -> Workflow {
        let cfg = &self.config;
        let steps = vec![
            RunCommand::new(["git pull"]).into(),
            RunCommand::new(["git pull"]).at(&cfg.repo_dir).into(),
            Step::remove(&cfg.env),
            self.install_toolkit(),
            RunCommand::new([PURGE_GENERIC_BACKEND, INSTALL_REQUIREMENTS])
                .in_venv(&cfg.env)
                .into(),
            self.backend(),
            Step::link(&cfg.env),
        ];
        Workflow::new(UPDATE, &self.root, steps)
    }

    fn install_toolkit(&self) -> Step {
        let cfg = &self.config;
        RunCommand::new([INSTALL_TOOLKIT])
            .at(&cfg.repo_dir)
            .in_venv(venv_from(&cfg.repo_dir, &cfg.env))
            .into()
    }

    fn backend(&self) -> Step {
        let cfg = &self.config;
        let mut call = StartSubWorkflow::new(&cfg.backend_uri).param("venv", cfg.env.as_str());
        for (key, value) in &cfg.backend_params {
            call.params.insert(key.clone(), value.clone());
        }
        call.into()
    }
}

/// `env` as seen from inside `dir`, e.g. `../env` from `stable-audio-tools`.
fn venv_from(dir: &str, env: &str) -> String {
    let depth = Path::new(dir)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    let mut venv = "../".repeat(depth);
    venv.push_str(env);
    venv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::StepKind;

    fn catalog() -> WorkflowCatalog {
        WorkflowCatalog::new("/apps/audio", CatalogConfig::default())
    }

    #[test]
    fn test_install_shape() {
        let install = catalog().install();
        assert_eq!(install.id(), INSTALL);
        let kinds: Vec<_> = install.steps().iter().map(Step::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::RunCommand,
                StepKind::RunCommand,
                StepKind::RunCommand,
                StepKind::StartSubWorkflow,
                StepKind::LinkPath,
            ]
        );
        match &install.steps()[1] {
            Step::RunCommand(cmd) => {
                assert_eq!(cmd.path.as_deref(), Some("stable-audio-tools"));
                assert_eq!(cmd.venv.as_deref(), Some("../env"));
                assert_eq!(cmd.message, vec![INSTALL_TOOLKIT.to_string()]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_update_shape() {
        let update = catalog().update();
        let kinds: Vec<_> = update.steps().iter().map(Step::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::RunCommand,
                StepKind::RunCommand,
                StepKind::RemovePath,
                StepKind::RunCommand,
                StepKind::RunCommand,
                StepKind::StartSubWorkflow,
                StepKind::LinkPath,
            ]
        );
        assert_eq!(update.steps()[2], Step::remove("env"));
    }

    #[test]
    fn test_install_and_update_converge_on_same_tail() {
        let catalog = catalog();
        let install = catalog.install();
        let update = catalog.update();
        let install_tail = &install.steps()[install.len() - 2..];
        let update_tail = &update.steps()[update.len() - 2..];
        assert_eq!(install_tail, update_tail);
    }

    #[test]
    fn test_backend_params_are_merged() {
        let mut config = CatalogConfig::default();
        config.backend_params.insert("xformers".into(), Value::Bool(true));
        let install = WorkflowCatalog::new("/apps/audio", config).install();
        match &install.steps()[3] {
            Step::StartSubWorkflow(call) => {
                assert_eq!(call.uri, "torch.js");
                assert_eq!(call.params["venv"], "env");
                assert_eq!(call.params["xformers"], true);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_get_unknown() {
        assert!(matches!(
            catalog().get("repair"),
            Err(WorkflowError::UnknownWorkflow(name)) if name == "repair"
        ));
        for name in WORKFLOW_NAMES {
            assert_eq!(catalog().get(name).unwrap().id(), name);
        }
    }

    #[test]
    fn test_venv_from_nested_dir() {
        assert_eq!(venv_from("stable-audio-tools", "env"), "../env");
        assert_eq!(venv_from("vendor/toolkit", "env"), "../../env");
        assert_eq!(venv_from("./toolkit", "env"), "../env");
    }
}
