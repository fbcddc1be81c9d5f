//! Engine events for progress rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::model::StepKind;

/// Events emitted while a workflow runs. Nested sub-workflow runs emit their
/// own events with a higher `depth`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    WorkflowStarted {
        run_id: Uuid,
        workflow: String,
        depth: usize,
        steps: usize,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        run_id: Uuid,
        workflow: String,
        index: usize,
        kind: StepKind,
        timestamp: DateTime<Utc>,
    },
    StepSucceeded {
        run_id: Uuid,
        workflow: String,
        index: usize,
        kind: StepKind,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        run_id: Uuid,
        workflow: String,
        index: usize,
        kind: StepKind,
        error: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowFinished {
        run_id: Uuid,
        workflow: String,
        depth: usize,
        succeeded: bool,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            EngineEvent::WorkflowStarted { run_id, .. }
            | EngineEvent::StepStarted { run_id, .. }
            | EngineEvent::StepSucceeded { run_id, .. }
            | EngineEvent::StepFailed { run_id, .. }
            | EngineEvent::WorkflowFinished { run_id, .. } => *run_id,
        }
    }
}

pub type EventSender = mpsc::Sender<EngineEvent>;
pub type EventReceiver = mpsc::Receiver<EngineEvent>;

pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

/// Optional event sink. Emission never blocks the engine: when the channel is
/// full or closed the event is dropped.
#[derive(Clone, Default)]
pub struct EventEmitter {
    tx: Option<EventSender>,
}

impl EventEmitter {
    pub fn new(tx: EventSender) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(error = %e, "engine event dropped");
            }
        }
    }
}
