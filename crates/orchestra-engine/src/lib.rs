//! Orchestra Workflow Engine
//!
//! This crate executes published workflows, one session at a time and one
//! node at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionRunner                          │
//! │  - owns mpsc channel of inbound messages                    │
//! │  - start(cancel) resumes the addressed sessions             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ExecutionEngine                         │
//! │  - start(workflow, vars, input) / resume(session, input)    │
//! │  - interpolates {{ }} placeholders in node data             │
//! │  - saves the session after every node                       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              PublishedWorkflow / NodeExecutor               │
//! │  - executors and breakers resolved once by the Publisher    │
//! │  - collaborator calls go through a ProtectedCall            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let registry = NodeRegistry::with_builtins(messages, webhooks);
//! let publisher = Publisher::new(Arc::new(registry), breakers, retry);
//! let workflow = publisher.publish(def)?;
//!
//! let engine = ExecutionEngine::new(sessions, config.engine);
//! let session = engine.start(&workflow, variables, None).await?;
//! ```

mod builtin;
mod engine;
mod error;
mod events;
mod executor;
mod interpolate;
mod publish;
mod registry;
mod runner;

pub use builtin::{
  CollectInputExecutor, ConditionExecutor, EndExecutor, HttpRequestExecutor,
  MultipleChoiceExecutor, Operator, SendMessageExecutor, SetVariableExecutor, StartExecutor,
  TransferToHumanExecutor,
};
pub use engine::ExecutionEngine;
pub use error::{EngineError, NodeError, NodeIssue, PublishError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{Flow, NodeContext, NodeExecutionResult, NodeExecutor};
pub use interpolate::Interpolator;
pub use publish::{PublishedWorkflow, Publisher};
pub use registry::NodeRegistry;
pub use runner::{InboundMessage, SessionRunner};
