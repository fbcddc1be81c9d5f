pub mod config;
pub mod engine;
pub mod environment;
pub mod event_bus;
pub mod paths;
pub mod resolver;
pub mod workflow_resolver;

pub use config::{CreatorKind, EngineConfig, EnvironmentConfig, Settings, ShellConfig};
pub use engine::{WorkflowEngine, WorkflowEngineBuilder};
pub use environment::{
    ActivationGuard, DirectoryCreator, EnvironmentCreator, EnvironmentRef, EnvironmentRegistry,
    PythonVenvCreator,
};
pub use event_bus::{create_event_channel, EngineEvent, EventEmitter, EventReceiver, EventSender};
pub use resolver::{
    CommandInvocation, LinkRequest, ParameterResolver, RemoveRequest, ResolvedStep,
    SubWorkflowCall,
};
pub use workflow_resolver::{FileWorkflowResolver, StaticWorkflowResolver, WorkflowResolver};
