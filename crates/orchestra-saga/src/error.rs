use std::time::Duration;

use orchestra_resilience::{CallError, CollaboratorError, Retryable};
use orchestra_store::StoreError;
use uuid::Uuid;

use crate::run::{SagaRun, SagaStatus};

/// Failure of a single forward or compensating action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
  /// Input or business rule violation. Never retried.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// A collaborator failure that may succeed later.
  #[error("transient failure: {0}")]
  Transient(String),

  #[error("circuit '{name}' is open")]
  CircuitOpen { name: String },

  #[error("call through circuit '{name}' timed out after {timeout:?}")]
  Timeout { name: String, timeout: Duration },

  #[error("{0}")]
  Internal(String),
}

impl Retryable for StepError {
  fn is_retryable(&self) -> bool {
    matches!(self, StepError::Transient(_) | StepError::Timeout { .. })
  }
}

impl From<CollaboratorError> for StepError {
  fn from(e: CollaboratorError) -> Self {
    match e {
      CollaboratorError::Validation(msg) => StepError::Validation(msg),
      CollaboratorError::NotFound(msg) => StepError::NotFound(msg),
      CollaboratorError::Transient(msg) => StepError::Transient(msg),
    }
  }
}

impl From<CallError<CollaboratorError>> for StepError {
  fn from(e: CallError<CollaboratorError>) -> Self {
    match e {
      CallError::CircuitOpen { name } => StepError::CircuitOpen { name },
      CallError::Timeout { name, timeout } => StepError::Timeout { name, timeout },
      CallError::Inner(inner) => inner.into(),
    }
  }
}

impl From<StoreError> for StepError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::NotFound { .. } => StepError::NotFound(e.to_string()),
      other => StepError::Internal(other.to_string()),
    }
  }
}

/// A saga that stopped on a failing step.
///
/// `source` is always the error of the step that triggered compensation,
/// whatever the compensations did. `uncompensated` lists the completed steps
/// that still need manual attention.
#[derive(Debug, thiserror::Error)]
#[error("saga '{saga}' failed at step '{step}' ({status:?}): {source}")]
pub struct SagaFailure {
  pub saga: String,
  pub run_id: Uuid,
  pub step: String,
  #[source]
  pub source: StepError,
  pub status: SagaStatus,
  pub compensated: Vec<String>,
  pub uncompensated: Vec<String>,
  pub run: SagaRun,
}

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
  #[error("invalid saga definition '{saga}': {message}")]
  InvalidDefinition { saga: String, message: String },

  #[error(transparent)]
  Failed(Box<SagaFailure>),

  #[error("run {run_id} belongs to saga '{run_saga}', not '{saga}'")]
  DefinitionMismatch {
    run_id: Uuid,
    run_saga: String,
    saga: String,
  },

  #[error("run {run_id} has status {status:?} and has nothing to compensate")]
  NothingToCompensate { run_id: Uuid, status: SagaStatus },
}

impl SagaError {
  pub fn failure(&self) -> Option<&SagaFailure> {
    match self {
      SagaError::Failed(failure) => Some(failure),
      _ => None,
    }
  }
}
