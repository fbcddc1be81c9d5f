//! `fs.link`: expose an environment root at a stable, host-visible location.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{LinkExecutor, StepContext};
use crate::core::config::DEFAULT_LINK_DIR;
use crate::core::resolver::LinkRequest;
use crate::error::StepError;

/// What [`ensure_link`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    Unchanged,
    Replaced,
}

/// Creates `<link_dir>/<environment name>` as a symlink to the environment.
pub struct SymlinkExecutor {
    link_dir: Option<PathBuf>,
}

impl SymlinkExecutor {
    /// `None` places links under `<environment root>/.links`.
    pub fn new(link_dir: Option<PathBuf>) -> Self {
        Self { link_dir }
    }
}

#[async_trait]
impl LinkExecutor for SymlinkExecutor {
    async fn link(&self, request: &LinkRequest, ctx: &StepContext<'_>) -> Result<(), StepError> {
        let registry = ctx.registry();
        let target = registry.path(&request.environment);
        if !registry.exists(&request.environment) {
            return Err(StepError::LinkFailed {
                target,
                cause: "environment does not exist".into(),
            });
        }

        let link_dir = self
            .link_dir
            .clone()
            .unwrap_or_else(|| registry.root().join(DEFAULT_LINK_DIR));
        let link = link_dir.join(&request.environment);
        let outcome = ensure_link(&link, &target)
            .await
            .map_err(|cause| StepError::LinkFailed {
                target: target.clone(),
                cause,
            })?;
        tracing::info!(
            env = %request.environment,
            link = %link.display(),
            outcome = ?outcome,
            "environment linked"
        );
        Ok(())
    }
}

/// Make `link` a symlink to `target`.
///
/// An existing link to the same target is left alone and a link to another
/// target is replaced. Anything else occupying `link` is an error and is not
/// touched.
pub async fn ensure_link(link: &Path, target: &Path) -> Result<LinkOutcome, String> {
    let outcome = match tokio::fs::symlink_metadata(link).await {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            let current = tokio::fs::read_link(link)
                .await
                .map_err(|e| format!("cannot read existing link {}: {}", link.display(), e))?;
            if current == target {
                return Ok(LinkOutcome::Unchanged);
            }
            remove_link(link)
                .await
                .map_err(|e| format!("cannot replace link {}: {}", link.display(), e))?;
            LinkOutcome::Replaced
        }
        Ok(_) => return Err(format!("{} exists and is not a link", link.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => LinkOutcome::Created,
        Err(e) => return Err(format!("cannot inspect {}: {}", link.display(), e)),
    };

    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }
    create_symlink(target, link)
        .await
        .map_err(|e| format!("cannot create link {}: {}", link.display(), e))?;
    Ok(outcome)
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_dir(target, link).await
}

#[cfg(unix)]
async fn remove_link(link: &Path) -> std::io::Result<()> {
    tokio::fs::remove_file(link).await
}

#[cfg(windows)]
async fn remove_link(link: &Path) -> std::io::Result<()> {
    // Directory symlinks are removed as directories on Windows.
    match tokio::fs::remove_dir(link).await {
        Ok(()) => Ok(()),
        Err(_) => tokio::fs::remove_file(link).await,
    }
}
