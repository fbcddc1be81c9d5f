use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StepFailure;

/// Phases of the `update` workflow.
///
/// `Fresh → SourceSynced → EnvPurged → EnvRebuilt → BackendInstalled → Linked`.
/// A failed run stops in whatever phase its last completed step reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Fresh,
    SourceSynced,
    EnvPurged,
    EnvRebuilt,
    BackendInstalled,
    Linked,
}

impl UpdateState {
    /// Phase reached once the first `completed` update steps have succeeded.
    pub fn after_completed(completed: usize) -> Self {
        match completed {
            0 | 1 => UpdateState::Fresh,
            2 => UpdateState::SourceSynced,
            3 => UpdateState::EnvPurged,
            4 | 5 => UpdateState::EnvRebuilt,
            6 => UpdateState::BackendInstalled,
            _ => UpdateState::Linked,
        }
    }

    /// Phase reached by an update run that ended with `outcome`.
    pub fn from_outcome(outcome: &Result<(), StepFailure>) -> Self {
        match outcome {
            Ok(()) => UpdateState::Linked,
            Err(failure) => Self::after_completed(failure.index),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            UpdateState::Fresh => Some(UpdateState::SourceSynced),
            UpdateState::SourceSynced => Some(UpdateState::EnvPurged),
            UpdateState::EnvPurged => Some(UpdateState::EnvRebuilt),
            UpdateState::EnvRebuilt => Some(UpdateState::BackendInstalled),
            UpdateState::BackendInstalled => Some(UpdateState::Linked),
            UpdateState::Linked => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == UpdateState::Linked
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateState::Fresh => "fresh",
            UpdateState::SourceSynced => "source_synced",
            UpdateState::EnvPurged => "env_purged",
            UpdateState::EnvRebuilt => "env_rebuilt",
            UpdateState::BackendInstalled => "backend_installed",
            UpdateState::Linked => "linked",
        };
        f.write_str(name)
    }
}
