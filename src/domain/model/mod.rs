//! Protocol-stable model types shared across layers.

mod step;
mod workflow;

pub use step::{LinkPath, RemovePath, RunCommand, StartSubWorkflow, Step, StepKind};
pub use workflow::Workflow;
