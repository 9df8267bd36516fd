//! Orchestra Workflow
//!
//! This crate provides the published workflow representation for Orchestra.
//! A published workflow is the validated form of a [`WorkflowDef`] that is
//! ready for sessions to traverse.
//!
//! Key differences from `orchestra-config`:
//! - Node types are resolved into the closed [`NodeKind`] set
//! - Graph structure is validated (unique ids, valid edges, one entry node,
//!   every node reachable from the entry)
//! - The workflow is immutable; changes are made by publishing a new version
//!
//! It also holds [`WorkflowSession`], the mutable state of one traversal.
//!
//! [`WorkflowDef`]: orchestra_config::WorkflowDef

mod error;
mod graph;
mod node;
mod session;
mod workflow;

pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{Node, NodeKind};
pub use session::{NodeVisit, SessionFailure, SessionStatus, VisitOutcome, WorkflowSession};
pub use workflow::Workflow;
