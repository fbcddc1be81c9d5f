//! Environment registry.
//!
//! Environments are directories under a single registry root, addressed by
//! their path relative to that root (`env`, `apps/env`). They persist across
//! process invocations; the registry itself only keeps the in-process lease
//! table used to stop a step from deleting an environment another step is
//! running in.
//!
//! Leases are per process. Two engine processes provisioning the same
//! environment concurrently are not detected.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use crate::core::config::{CreatorKind, EnvironmentConfig};
use crate::core::paths::{absolutize, remove_path};
use crate::error::StepError;

/// Folder inside an environment that holds its executables.
#[cfg(windows)]
pub const BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
pub const BIN_DIR: &str = "bin";

/// Creates the on-disk layout of a new environment.
#[async_trait]
pub trait EnvironmentCreator: Send + Sync {
    async fn create(&self, root: &Path) -> Result<(), String>;
}

/// Runs `<python> -m venv <root>`.
pub struct PythonVenvCreator {
    python: String,
}

impl PythonVenvCreator {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl EnvironmentCreator for PythonVenvCreator {
    async fn create(&self, root: &Path) -> Result<(), String> {
        let status = tokio::process::Command::new(&self.python)
            .arg("-m")
            .arg("venv")
            .arg(root)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| format!("failed to start `{}`: {}", self.python, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("`{} -m venv` exited with {}", self.python, status))
        }
    }
}

/// Creates a bare directory with an empty binaries folder.
pub struct DirectoryCreator;

#[async_trait]
impl EnvironmentCreator for DirectoryCreator {
    async fn create(&self, root: &Path) -> Result<(), String> {
        tokio::fs::create_dir_all(root.join(BIN_DIR))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Build the creator selected by configuration.
pub fn creator_from_config(config: &EnvironmentConfig) -> Arc<dyn EnvironmentCreator> {
    match config.creator {
        CreatorKind::Venv => Arc::new(PythonVenvCreator::new(config.python.clone())),
        CreatorKind::Directory => Arc::new(DirectoryCreator),
    }
}

/// A resolved environment: its registry name and root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRef {
    pub name: String,
    pub root: PathBuf,
}

impl EnvironmentRef {
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }
}

/// Registry of named environments under one root directory.
pub struct EnvironmentRegistry {
    root: PathBuf,
    creator: Arc<dyn EnvironmentCreator>,
    leases: Mutex<HashMap<String, usize>>,
}

impl EnvironmentRegistry {
    pub fn new(root: impl AsRef<Path>, creator: Arc<dyn EnvironmentCreator>) -> Self {
        Self {
            root: absolutize(root.as_ref()),
            creator,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn get(&self, name: &str) -> EnvironmentRef {
        EnvironmentRef {
            name: name.to_string(),
            root: self.path(name),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_dir()
    }

    /// Return the environment, creating it first if its directory is missing.
    pub async fn ensure(&self, name: &str) -> Result<EnvironmentRef, StepError> {
        let env = self.get(name);
        if env.root.is_dir() {
            return Ok(env);
        }
        if let Some(parent) = env.root.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::EnvironmentFailed {
                    name: name.to_string(),
                    cause: e.to_string(),
                })?;
        }
        tracing::info!(env = name, root = %env.root.display(), "creating environment");
        self.creator
            .create(&env.root)
            .await
            .map_err(|cause| StepError::EnvironmentFailed {
                name: name.to_string(),
                cause,
            })?;
        Ok(env)
    }

    /// Delete an environment. Returns whether anything was removed.
    pub async fn remove(&self, name: &str) -> Result<bool, StepError> {
        self.purge(&self.path(name)).await
    }

    /// Delete `path` unless a leased environment lives at or below it.
    /// Returns whether anything was removed; an absent path is not an error.
    pub async fn purge(&self, path: &Path) -> Result<bool, StepError> {
        if let Some(name) = self.leased_under(path) {
            return Err(StepError::EnvironmentBusy { name });
        }
        remove_path(path)
            .await
            .map_err(|e| StepError::RemoveFailed {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })
    }

    /// Activate an environment for the lifetime of the returned guard.
    pub fn activate(self: &Arc<Self>, env: &EnvironmentRef) -> ActivationGuard {
        *self.leases.lock().entry(env.name.clone()).or_insert(0) += 1;
        tracing::debug!(env = %env.name, "environment activated");
        ActivationGuard {
            registry: Arc::clone(self),
            env: env.clone(),
        }
    }

    pub fn is_leased(&self, name: &str) -> bool {
        self.leases.lock().contains_key(name)
    }

    /// Name of a leased environment that lives at or below `path`, if any.
    pub fn leased_under(&self, path: &Path) -> Option<String> {
        let path = absolutize(path);
        self.leases
            .lock()
            .keys()
            .find(|name| self.path(name).starts_with(&path))
            .cloned()
    }

    fn release(&self, name: &str) {
        let mut leases = self.leases.lock();
        if let Some(count) = leases.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                leases.remove(name);
            }
        }
    }
}

/// Scoped activation of an environment.
///
/// While alive it holds a lease on the environment; [`apply`](Self::apply)
/// configures a subprocess to run inside it. The engine's own process
/// environment is never modified.
pub struct ActivationGuard {
    registry: Arc<EnvironmentRegistry>,
    env: EnvironmentRef,
}

impl ActivationGuard {
    pub fn environment(&self) -> &EnvironmentRef {
        &self.env
    }

    /// `PATH` with the environment's binaries first.
    pub fn search_path(&self) -> Result<OsString, StepError> {
        let mut entries = vec![self.env.bin_dir()];
        if let Some(current) = std::env::var_os("PATH") {
            entries.extend(std::env::split_paths(&current));
        }
        std::env::join_paths(entries).map_err(|e| StepError::EnvironmentFailed {
            name: self.env.name.clone(),
            cause: e.to_string(),
        })
    }

    pub fn apply(&self, command: &mut tokio::process::Command) -> Result<(), StepError> {
        command
            .env("PATH", self.search_path()?)
            .env("VIRTUAL_ENV", &self.env.root)
            .env_remove("PYTHONHOME");
        Ok(())
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.env.name);
        tracing::debug!(env = %self.env.name, "environment released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(root: &Path) -> Arc<EnvironmentRegistry> {
        Arc::new(EnvironmentRegistry::new(root, Arc::new(DirectoryCreator)))
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(!registry.exists("env"));

        let env = registry.ensure("env").await.unwrap();
        assert!(registry.exists("env"));
        assert!(env.bin_dir().is_dir());

        std::fs::write(env.root.join("marker"), "x").unwrap();
        registry.ensure("env").await.unwrap();
        assert!(env.root.join("marker").exists());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.ensure("env").await.unwrap();

        assert!(registry.remove("env").await.unwrap());
        assert!(!registry.exists("env"));
        assert!(!registry.remove("env").await.unwrap());
    }

    #[tokio::test]
    async fn test_leases_follow_guards() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let env = registry.ensure("env").await.unwrap();

        let first = registry.activate(&env);
        let second = registry.activate(&env);
        assert!(registry.is_leased("env"));
        drop(first);
        assert!(registry.is_leased("env"));
        assert!(matches!(
            registry.remove("env").await,
            Err(StepError::EnvironmentBusy { .. })
        ));
        drop(second);
        assert!(!registry.is_leased("env"));
        assert!(registry.remove("env").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_refuses_parent_of_leased_environment() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let env = registry.ensure("apps/env").await.unwrap();
        let guard = registry.activate(&env);

        let apps = dir.path().join("apps");
        assert!(matches!(
            registry.purge(&apps).await,
            Err(StepError::EnvironmentBusy { name }) if name == "apps/env"
        ));
        assert!(env.root.is_dir());

        drop(guard);
        assert!(registry.purge(&apps).await.unwrap());
        assert!(!registry.purge(&apps).await.unwrap());
    }

    #[tokio::test]
    async fn test_leased_under_matches_parents() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let env = registry.ensure("apps/env").await.unwrap();
        let _guard = registry.activate(&env);

        assert_eq!(
            registry.leased_under(&dir.path().join("apps")),
            Some("apps/env".to_string())
        );
        assert_eq!(registry.leased_under(&dir.path().join("other")), None);
    }

    #[tokio::test]
    async fn test_search_path_prepends_bin_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let env = registry.ensure("env").await.unwrap();
        let guard = registry.activate(&env);

        let search = guard.search_path().unwrap();
        let first = std::env::split_paths(&search).next().unwrap();
        assert_eq!(first, env.bin_dir());
    }

    #[tokio::test]
    async fn test_failing_creator_reports_environment() {
        struct Broken;
        #[async_trait]
        impl EnvironmentCreator for Broken {
            async fn create(&self, _root: &Path) -> Result<(), String> {
                Err("no interpreter".into())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let registry = EnvironmentRegistry::new(dir.path(), Arc::new(Broken));
        match registry.ensure("env").await {
            Err(StepError::EnvironmentFailed { name, cause }) => {
                assert_eq!(name, "env");
                assert_eq!(cause, "no interpreter");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
