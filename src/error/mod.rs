//! Error types for the provisioning engine.
//!
//! - [`StepError`]: Errors raised by a single step executor.
//! - [`StepFailure`]: A step error annotated with its position in a workflow run.
//! - [`WorkflowError`]: Load-time errors for parsing and validating workflow definitions.

pub mod step_error;
pub mod workflow_error;

pub use step_error::{StepError, StepFailure};
pub use workflow_error::WorkflowError;

