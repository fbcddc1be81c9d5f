//! Domain layer: pure workflow model shared by the DSL, the engine and the
//! executors.
//!
//! Submodules:
//! - [`model`]: Steps, step kinds and workflows.

pub mod model;
