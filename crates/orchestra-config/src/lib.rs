//! Orchestra Config
//!
//! This crate contains the serializable configuration types for Orchestra.
//! Workflow definitions are the authored form of a workflow graph, before they
//! are validated and published by the engine. Settings configure the
//! long-lived runtime pieces: circuit breakers, retry policy, the execution
//! engine and the external collaborators.
//!
//! Settings are loaded from a JSON file (via CLI with `--config`); workflow
//! definitions are read from their own JSON files.

mod enums;
mod error;
mod node;
mod settings;
mod workflow;

pub use enums::RetryBackoff;
pub use error::ConfigError;
pub use node::NodeDef;
pub use settings::{
  AppConfig, BreakerSettings, CollaboratorSettings, EngineSettings, RetrySettings,
};
pub use workflow::WorkflowDef;
