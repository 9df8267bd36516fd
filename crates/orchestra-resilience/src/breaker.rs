//! Three-state circuit breaker.

use std::future::Future;
use std::time::Duration;

use orchestra_config::BreakerSettings;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{CallError, ResilienceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
  Closed,
  Open,
  HalfOpen,
}

/// Validated breaker thresholds. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
  pub failure_threshold: u32,
  /// Time spent open before a trial call is let through.
  pub retry_timeout: Duration,
  /// Deadline applied to every call that is let through.
  pub call_timeout: Duration,
}

impl BreakerConfig {
  pub fn new(
    name: &str,
    failure_threshold: u32,
    retry_timeout: Duration,
    call_timeout: Duration,
  ) -> Result<Self, ResilienceError> {
    let invalid = |message: &str| ResilienceError::InvalidConfig {
      name: name.to_string(),
      message: message.to_string(),
    };
    if failure_threshold < 1 {
      return Err(invalid("failure_threshold must be at least 1"));
    }
    if retry_timeout.is_zero() {
      return Err(invalid("retry_timeout must be greater than zero"));
    }
    if call_timeout.is_zero() {
      return Err(invalid("call_timeout must be greater than zero"));
    }
    Ok(Self {
      failure_threshold,
      retry_timeout,
      call_timeout,
    })
  }

  pub fn from_settings(name: &str, settings: &BreakerSettings) -> Result<Self, ResilienceError> {
    Self::new(
      name,
      settings.failure_threshold,
      settings.retry_timeout(),
      settings.call_timeout(),
    )
  }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
  pub name: String,
  pub state: BreakerState,
  pub failure_count: u32,
}

#[derive(Debug)]
struct Inner {
  state: BreakerState,
  failure_count: u32,
  opened_at: Option<Instant>,
  trial_in_flight: bool,
}

/// Circuit breaker guarding one collaborator.
///
/// State lives behind a mutex that is never held across an await point. In
/// the half-open state a single trial call is admitted; concurrent callers
/// are refused as if the breaker were still open.
#[derive(Debug)]
pub struct CircuitBreaker {
  name: String,
  config: BreakerConfig,
  inner: Mutex<Inner>,
}

impl CircuitBreaker {
  pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
    Self {
      name: name.into(),
      config,
      inner: Mutex::new(Inner {
        state: BreakerState::Closed,
        failure_count: 0,
        opened_at: None,
        trial_in_flight: false,
      }),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &BreakerConfig {
    &self.config
  }

  /// Stored state. An open breaker whose retry timeout has elapsed reports
  /// `Open` until the next call moves it to `HalfOpen`.
  pub fn state(&self) -> BreakerState {
    self.inner.lock().state
  }

  pub fn failure_count(&self) -> u32 {
    self.inner.lock().failure_count
  }

  pub fn snapshot(&self) -> BreakerSnapshot {
    let inner = self.inner.lock();
    BreakerSnapshot {
      name: self.name.clone(),
      state: inner.state,
      failure_count: inner.failure_count,
    }
  }

  /// Invoke `operation` through the breaker.
  ///
  /// Any error, including a timeout, counts as a failure. A call whose future
  /// is dropped before it finishes also counts as a failure.
  #[instrument(name = "breaker_call", skip_all, fields(breaker = %self.name))]
  pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let permit = self.acquire().ok_or_else(|| CallError::CircuitOpen {
      name: self.name.clone(),
    })?;

    match tokio::time::timeout(self.config.call_timeout, operation()).await {
      Ok(Ok(value)) => {
        permit.succeed();
        Ok(value)
      }
      Ok(Err(e)) => {
        permit.fail();
        Err(CallError::Inner(e))
      }
      Err(_) => {
        permit.fail();
        Err(CallError::Timeout {
          name: self.name.clone(),
          timeout: self.config.call_timeout,
        })
      }
    }
  }

  fn acquire(&self) -> Option<Permit<'_>> {
    let mut inner = self.inner.lock();
    match inner.state {
      BreakerState::Closed => Some(Permit::new(self, false)),
      BreakerState::Open => {
        let elapsed = inner
          .opened_at
          .is_some_and(|at| at.elapsed() >= self.config.retry_timeout);
        if !elapsed {
          return None;
        }
        inner.state = BreakerState::HalfOpen;
        inner.trial_in_flight = true;
        debug!(breaker = %self.name, "breaker_half_open");
        Some(Permit::new(self, true))
      }
      BreakerState::HalfOpen => {
        if inner.trial_in_flight {
          return None;
        }
        inner.trial_in_flight = true;
        Some(Permit::new(self, true))
      }
    }
  }

  fn record_success(&self, trial: bool) {
    let mut inner = self.inner.lock();
    if trial {
      inner.state = BreakerState::Closed;
      inner.failure_count = 0;
      inner.opened_at = None;
      inner.trial_in_flight = false;
      debug!(breaker = %self.name, "breaker_closed");
    } else if inner.state == BreakerState::Closed {
      inner.failure_count = 0;
    }
    // A normal call admitted while closed may finish after the breaker
    // opened; its success says nothing about recovery.
  }

  fn record_failure(&self, trial: bool) {
    let mut inner = self.inner.lock();
    if trial {
      inner.state = BreakerState::Open;
      inner.opened_at = Some(Instant::now());
      inner.trial_in_flight = false;
      warn!(breaker = %self.name, "breaker_reopened");
      return;
    }
    if inner.state != BreakerState::Closed {
      return;
    }
    inner.failure_count += 1;
    if inner.failure_count >= self.config.failure_threshold {
      inner.state = BreakerState::Open;
      inner.opened_at = Some(Instant::now());
      warn!(
        breaker = %self.name,
        failure_count = inner.failure_count,
        "breaker_opened"
      );
    }
  }
}

/// Admission to make one call. Dropping an unsettled permit records a failure.
struct Permit<'a> {
  breaker: &'a CircuitBreaker,
  trial: bool,
  settled: bool,
}

impl<'a> Permit<'a> {
  fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
    Self {
      breaker,
      trial,
      settled: false,
    }
  }

  fn succeed(mut self) {
    self.settled = true;
    self.breaker.record_success(self.trial);
  }

  fn fail(mut self) {
    self.settled = true;
    self.breaker.record_failure(self.trial);
  }
}

impl Drop for Permit<'_> {
  fn drop(&mut self) {
    if !self.settled {
      self.breaker.record_failure(self.trial);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  fn breaker(threshold: u32) -> CircuitBreaker {
    let config = BreakerConfig::new(
      "platform",
      threshold,
      Duration::from_secs(30),
      Duration::from_secs(5),
    )
    .unwrap();
    CircuitBreaker::new("platform", config)
  }

  async fn fail(breaker: &CircuitBreaker) -> CallError<&'static str> {
    breaker
      .call(|| async { Err::<(), _>("boom") })
      .await
      .unwrap_err()
  }

  #[test]
  fn test_config_rejects_zero_threshold() {
    let err = BreakerConfig::new("crm", 0, Duration::from_secs(1), Duration::from_secs(1));
    assert!(matches!(err, Err(ResilienceError::InvalidConfig { .. })));
  }

  #[tokio::test(start_paused = true)]
  async fn test_opens_after_threshold_and_fails_fast() {
    let breaker = breaker(3);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
      let err = breaker
        .call(|| async {
          calls.fetch_add(1, Ordering::SeqCst);
          Err::<(), _>("boom")
        })
        .await
        .unwrap_err();
      assert!(matches!(err, CallError::Inner("boom")));
    }
    assert_eq!(breaker.state(), BreakerState::Open);

    let err = breaker
      .call(|| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, &str>(())
      })
      .await
      .unwrap_err();

    assert!(err.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_resets_failure_count() {
    let breaker = breaker(3);

    fail(&breaker).await;
    fail(&breaker).await;
    assert_eq!(breaker.failure_count(), 2);

    breaker.call(|| async { Ok::<_, &str>(1) }).await.unwrap();
    assert_eq!(breaker.failure_count(), 0);

    fail(&breaker).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), BreakerState::Closed);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stays_open_until_retry_timeout() {
    let breaker = breaker(1);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(fail(&breaker).await.is_circuit_open());
    assert_eq!(breaker.state(), BreakerState::Open);
  }

  #[tokio::test(start_paused = true)]
  async fn test_successful_trial_closes_breaker() {
    let breaker = breaker(1);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    let value = breaker.call(|| async { Ok::<_, &str>("ok") }).await.unwrap();

    assert_eq!(value, "ok");
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(breaker.failure_count(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_trial_reopens_and_resets_timer() {
    let breaker = breaker(1);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(matches!(fail(&breaker).await, CallError::Inner(_)));
    assert_eq!(breaker.state(), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(fail(&breaker).await.is_circuit_open());
  }

  #[tokio::test(start_paused = true)]
  async fn test_half_open_admits_a_single_trial() {
    let breaker = breaker(1);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let calls = AtomicUsize::new(0);
    let slow = breaker.call(|| async {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_secs(1)).await;
      Ok::<_, &str>("trial")
    });
    let racer = breaker.call(|| async {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok::<_, &str>("racer")
    });

    let (first, second) = tokio::join!(slow, racer);

    assert_eq!(first.unwrap(), "trial");
    assert!(second.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state(), BreakerState::Closed);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_counts_as_failure() {
    let breaker = breaker(2);

    let err = breaker
      .call(|| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, &str>(())
      })
      .await
      .unwrap_err();

    assert!(matches!(err, CallError::Timeout { .. }));
    assert_eq!(breaker.failure_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropped_trial_reopens_breaker() {
    let breaker = breaker(1);
    fail(&breaker).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let abandoned = tokio::time::timeout(
      Duration::from_millis(10),
      breaker.call(|| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, &str>(())
      }),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(breaker.state(), BreakerState::Open);
    assert!(fail(&breaker).await.is_circuit_open());
  }
}
