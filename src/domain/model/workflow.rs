use std::path::{Path, PathBuf};

use super::Step;

/// A named, ordered list of steps. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    id: String,
    root: PathBuf,
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            steps,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory that relative `path` params and sub-workflow URIs resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
