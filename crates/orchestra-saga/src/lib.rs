//! Orchestra Saga
//!
//! Multi-step business transactions against collaborators that cannot share
//! one database transaction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TransactionManager                       │
//! │  - atomic(op): one local transaction, commit or roll back   │
//! │  - run_saga(definition, context): logs name/status/duration │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SagaOrchestrator                         │
//! │  - runs steps in order, merging outputs into the context    │
//! │  - on failure compensates completed steps in reverse        │
//! │  - retry_compensation(run) for operator remediation         │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SagaStep                              │
//! │  - execute(context) → output                                │
//! │  - compensate(context after step, output)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Compensations must be idempotent and never need compensating themselves.
//! The orchestrator compensates each completed step at most once; a step whose
//! compensation failed stays in the log as failed until a later
//! [`SagaOrchestrator::retry_compensation`] succeeds.

mod context;
mod definition;
mod error;
mod log;
mod manager;
mod orchestrator;
mod run;
mod step;

pub use context::SagaContext;
pub use definition::SagaDefinition;
pub use error::{SagaError, SagaFailure, StepError};
pub use log::{CompensationState, StepLog, StepLogEntry};
pub use manager::TransactionManager;
pub use orchestrator::SagaOrchestrator;
pub use run::{FailedStep, SagaRun, SagaStatus};
pub use step::{FnStep, SagaStep};
