use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use envflow::catalog::{UPDATE, WORKFLOW_NAMES};
use envflow::dsl::schema_from_workflow;
use envflow::{load_workflow, Settings, UpdateState, Workflow, WorkflowCatalog, WorkflowEngine};

#[derive(Parser)]
#[command(name = "envflow", version, about = "Declarative environment provisioning")]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow file or a built-in workflow (`install`, `update`)
    Run {
        workflow: String,

        /// Application root; environments live here. Defaults to the
        /// manifest's directory, or the current directory for built-ins
        #[arg(long)]
        root: Option<PathBuf>,

        /// Workflow argument, `key=value`. Values parse as JSON, else as a string
        #[arg(long = "arg", value_parser = parse_arg)]
        args: Vec<(String, Value)>,
    },
    /// Parse and validate a workflow file, then print its step plan
    Check { file: PathBuf },
    /// Print a built-in workflow as JSON
    Catalog {
        name: String,

        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

fn parse_arg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Run {
            workflow,
            root,
            args,
        } => {
            let manifest = manifest_path(&workflow);
            let root = application_root(root.as_deref(), manifest.as_deref())?;
            let workflow = match &manifest {
                Some(path) => load_workflow(path).await?,
                None => builtin_workflow(&workflow, &root, &settings)?,
            };
            if !workflow.root().starts_with(&root) {
                tracing::warn!(
                    workflow_root = %workflow.root().display(),
                    root = %root.display(),
                    "workflow lives outside the application root; its environments may not resolve"
                );
            }
            let engine = WorkflowEngine::builder(&root)
                .config(settings.engine.clone())
                .build();

            let outcome = engine
                .run_with_args(&workflow, args.into_iter().collect::<Map<_, _>>())
                .await;
            if workflow.id() == UPDATE {
                println!("update state: {}", UpdateState::from_outcome(&outcome));
            }
            match outcome {
                Ok(()) => {
                    println!("workflow `{}` completed ({} steps)", workflow.id(), workflow.len());
                    Ok(true)
                }
                Err(failure) => {
                    eprintln!("error: {failure}");
                    let mut cause = failure.source();
                    while let Some(err) = cause {
                        eprintln!("  caused by: {err}");
                        cause = err.source();
                    }
                    Ok(false)
                }
            }
        }
        Command::Check { file } => {
            let workflow = load_workflow(&file).await?;
            println!("workflow `{}`: {} steps", workflow.id(), workflow.len());
            for (index, step) in schema_from_workflow(&workflow).run.iter().enumerate() {
                println!("  [{index}] {} {}", step.method, step.params);
            }
            Ok(true)
        }
        Command::Catalog { name, root } => {
            let catalog = WorkflowCatalog::new(canonical_root(&root)?, settings.catalog);
            let workflow = catalog.get(&name)?;
            let rendered = serde_json::to_string_pretty(&schema_from_workflow(&workflow))?;
            println!("{rendered}");
            Ok(true)
        }
    }
}

/// Canonical path of `name` when it names an existing file. A file wins
/// over a built-in workflow of the same spelling.
fn manifest_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_file() {
        path.canonicalize().ok()
    } else {
        None
    }
}

fn builtin_workflow(name: &str, root: &Path, settings: &Settings) -> anyhow::Result<Workflow> {
    if !WORKFLOW_NAMES.contains(&name) {
        bail!("no workflow file or built-in workflow named `{name}`");
    }
    let catalog = WorkflowCatalog::new(root, settings.catalog.clone());
    Ok(catalog.get(name)?)
}

/// `--root` when given, else the manifest's directory, else the current
/// directory.
fn application_root(explicit: Option<&Path>, manifest: Option<&Path>) -> anyhow::Result<PathBuf> {
    match (explicit, manifest.and_then(Path::parent)) {
        (Some(root), _) => canonical_root(root),
        (None, Some(dir)) => canonical_root(dir),
        (None, None) => canonical_root(Path::new(".")),
    }
}

fn canonical_root(root: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("creating application root {}", root.display()))?;
    root.canonicalize()
        .with_context(|| format!("resolving application root {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg_json_and_string() {
        assert_eq!(parse_arg("n=3").unwrap(), ("n".into(), Value::from(3)));
        assert_eq!(
            parse_arg("venv=env").unwrap(),
            ("venv".into(), Value::String("env".into()))
        );
        assert_eq!(
            parse_arg("url=http://a/b?c=d").unwrap(),
            ("url".into(), Value::String("http://a/b?c=d".into()))
        );
        assert!(parse_arg("novalue").is_err());
        assert!(parse_arg("=x").is_err());
    }

    #[test]
    fn test_root_defaults_to_manifest_directory() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir(&app).unwrap();
        let file = app.join("wf.json");
        std::fs::write(&file, r#"{"run": []}"#).unwrap();

        let manifest = manifest_path(file.to_str().unwrap()).unwrap();
        let root = application_root(None, Some(&manifest)).unwrap();
        assert_eq!(root, app.canonicalize().unwrap());

        let explicit = dir.path().join("elsewhere");
        let root = application_root(Some(&explicit), Some(&manifest)).unwrap();
        assert_eq!(root, explicit.canonicalize().unwrap());
    }

    #[test]
    fn test_builtin_names_are_not_manifests() {
        assert_eq!(manifest_path("install-does-not-exist.json"), None);
        let settings = Settings::default();
        let workflow = builtin_workflow("update", Path::new("/apps/audio"), &settings).unwrap();
        assert_eq!(workflow.id(), "update");
        assert!(builtin_workflow("repair", Path::new("/apps/audio"), &settings).is_err());
    }
}
