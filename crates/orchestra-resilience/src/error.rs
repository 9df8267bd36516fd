use std::time::Duration;

/// Decides whether a [`RetryPolicy`](crate::RetryPolicy) may try an operation again.
pub trait Retryable {
  fn is_retryable(&self) -> bool;
}

/// Outcome of a call made through a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
  /// The breaker refused the call without invoking the operation.
  #[error("circuit '{name}' is open")]
  CircuitOpen { name: String },

  /// The operation exceeded the breaker's call timeout.
  #[error("call through circuit '{name}' timed out after {timeout:?}")]
  Timeout { name: String, timeout: Duration },

  /// The operation itself failed.
  #[error(transparent)]
  Inner(E),
}

impl<E> CallError<E> {
  pub fn is_circuit_open(&self) -> bool {
    matches!(self, CallError::CircuitOpen { .. })
  }

  pub fn inner(&self) -> Option<&E> {
    match self {
      CallError::Inner(e) => Some(e),
      _ => None,
    }
  }
}

impl<E: Retryable> Retryable for CallError<E> {
  fn is_retryable(&self) -> bool {
    match self {
      // Retrying against an open breaker only burns the caller's budget.
      CallError::CircuitOpen { .. } => false,
      CallError::Timeout { .. } => true,
      CallError::Inner(e) => e.is_retryable(),
    }
  }
}

/// Error reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
  /// The request was rejected and will be rejected again.
  #[error("collaborator rejected request: {0}")]
  Validation(String),

  /// The remote resource does not exist.
  #[error("remote resource not found: {0}")]
  NotFound(String),

  /// A failure that may succeed on a later attempt.
  #[error("transient collaborator failure: {0}")]
  Transient(String),
}

impl Retryable for CollaboratorError {
  fn is_retryable(&self) -> bool {
    matches!(self, CollaboratorError::Transient(_))
  }
}

/// Errors raised while configuring breakers.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
  #[error("invalid breaker configuration for '{name}': {message}")]
  InvalidConfig { name: String, message: String },

  #[error("no circuit breaker registered for collaborator '{name}'")]
  UnknownBreaker { name: String },

  #[error("circuit breaker '{name}' is already registered")]
  DuplicateBreaker { name: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_circuit_open_is_never_retryable() {
    let err: CallError<CollaboratorError> = CallError::CircuitOpen {
      name: "platform".to_string(),
    };
    assert!(!err.is_retryable());
    assert!(err.is_circuit_open());
  }

  #[test]
  fn test_retryable_follows_inner_error() {
    let transient = CallError::Inner(CollaboratorError::Transient("503".to_string()));
    let rejected = CallError::Inner(CollaboratorError::Validation("bad email".to_string()));
    let timeout: CallError<CollaboratorError> = CallError::Timeout {
      name: "platform".to_string(),
      timeout: Duration::from_secs(1),
    };

    assert!(transient.is_retryable());
    assert!(!rejected.is_retryable());
    assert!(timeout.is_retryable());
  }

  #[test]
  fn test_inner_error_message_is_transparent() {
    let err: CallError<CollaboratorError> =
      CallError::Inner(CollaboratorError::NotFound("campaign c-1".to_string()));
    assert_eq!(err.to_string(), "remote resource not found: campaign c-1");
  }
}
