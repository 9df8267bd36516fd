use std::fmt;
use std::time::Duration;

use orchestra_gateway::CollaboratorError;
use orchestra_resilience::{CallError, Retryable};
use orchestra_store::StoreError;
use orchestra_workflow::{SessionStatus, WorkflowError};

/// Failure of one node execution. The engine records it on the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
  /// The node's data or input cannot be used. Never retried.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error(transparent)]
  Collaborator(#[from] CollaboratorError),

  #[error("circuit '{name}' is open")]
  CircuitOpen { name: String },

  #[error("call through circuit '{name}' timed out after {timeout:?}")]
  Timeout { name: String, timeout: Duration },

  #[error("{0}")]
  Internal(String),
}

impl NodeError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }
}

impl Retryable for NodeError {
  fn is_retryable(&self) -> bool {
    match self {
      NodeError::Collaborator(e) => e.is_retryable(),
      NodeError::Timeout { .. } => true,
      _ => false,
    }
  }
}

impl From<CallError<CollaboratorError>> for NodeError {
  fn from(e: CallError<CollaboratorError>) -> Self {
    match e {
      CallError::CircuitOpen { name } => NodeError::CircuitOpen { name },
      CallError::Timeout { name, timeout } => NodeError::Timeout { name, timeout },
      CallError::Inner(inner) => NodeError::Collaborator(inner),
    }
  }
}

/// A problem found on one node while publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIssue {
  pub node_id: String,
  pub message: String,
}

impl fmt::Display for NodeIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "node '{}': {}", self.node_id, self.message)
  }
}

/// Why a workflow could not be published.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
  #[error("invalid workflow structure: {0}")]
  Structure(#[from] WorkflowError),

  #[error(
    "workflow '{workflow_id}' has {} invalid node(s): {}",
    issues.len(),
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
  )]
  Nodes {
    workflow_id: String,
    issues: Vec<NodeIssue>,
  },
}

impl PublishError {
  pub fn issues(&self) -> &[NodeIssue] {
    match self {
      PublishError::Nodes { issues, .. } => issues,
      PublishError::Structure(_) => &[],
    }
  }
}

/// Errors the engine returns to its caller. Node failures are not among
/// them: they fail the session instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("session store error: {0}")]
  Store(#[from] StoreError),

  #[error("session '{session_id}' belongs to workflow '{actual}', not '{expected}'")]
  WorkflowMismatch {
    session_id: String,
    expected: String,
    actual: String,
  },

  #[error("session '{session_id}' started on version {session_version}, not {published_version}")]
  VersionMismatch {
    session_id: String,
    session_version: u32,
    published_version: u32,
  },

  #[error("session '{session_id}' is {status:?} and cannot be resumed")]
  NotWaiting {
    session_id: String,
    status: SessionStatus,
  },

  #[error("session '{session_id}' is already being resumed")]
  SessionBusy { session_id: String },

  #[error("session runner channel closed")]
  ChannelClosed,
}
