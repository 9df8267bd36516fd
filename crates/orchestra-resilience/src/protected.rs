use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::error::{CallError, Retryable};
use crate::retry::RetryPolicy;

/// A collaborator call guarded by a breaker and retried by a policy.
///
/// Each attempt goes through the breaker. An open circuit is not retryable,
/// so it ends the loop on the attempt that observes it.
#[derive(Debug, Clone)]
pub struct ProtectedCall {
  breaker: Arc<CircuitBreaker>,
  retry: RetryPolicy,
}

impl ProtectedCall {
  pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
    Self { breaker, retry }
  }

  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.retry = self.retry.with_max_attempts(max_attempts);
    self
  }

  pub fn breaker(&self) -> &CircuitBreaker {
    &self.breaker
  }

  pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
  {
    let breaker = &*self.breaker;
    let operation = &operation;
    self
      .retry
      .execute(move |_| breaker.call(operation))
      .await
  }
}
