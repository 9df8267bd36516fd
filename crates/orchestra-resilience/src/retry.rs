//! Bounded retry with backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use orchestra_config::{RetryBackoff, RetrySettings};
use tracing::warn;

use crate::error::Retryable;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
  Constant { delay: Duration },
  Linear { initial: Duration, max: Duration },
  Exponential { initial: Duration, max: Duration },
}

impl Backoff {
  /// Delay after the given failed attempt (1-based), before jitter.
  pub fn delay(&self, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    match *self {
      Backoff::Constant { delay } => delay,
      Backoff::Linear { initial, max } => initial.saturating_mul(attempt).min(max),
      Backoff::Exponential { initial, max } => {
        let factor = 2u32.saturating_pow(attempt - 1);
        initial.saturating_mul(factor).min(max)
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub backoff: Backoff,
  /// Randomize each delay within `[delay / 2, delay]`.
  pub jitter: bool,
  /// Ceiling on cumulative sleep across all attempts.
  pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_settings(&RetrySettings::default())
  }
}

impl RetryPolicy {
  /// A policy that makes exactly one attempt.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      backoff: Backoff::Constant {
        delay: Duration::ZERO,
      },
      jitter: false,
      max_total_wait: Duration::ZERO,
    }
  }

  pub fn from_settings(settings: &RetrySettings) -> Self {
    let initial = Duration::from_millis(settings.initial_delay_ms);
    let max = Duration::from_millis(settings.max_delay_ms);
    let backoff = match settings.backoff {
      RetryBackoff::Constant => Backoff::Constant { delay: initial },
      RetryBackoff::Linear => Backoff::Linear { initial, max },
      RetryBackoff::Exponential => Backoff::Exponential { initial, max },
    };
    Self {
      max_attempts: settings.max_attempts.max(1),
      backoff,
      jitter: settings.jitter,
      max_total_wait: Duration::from_millis(settings.max_total_wait_ms),
    }
  }

  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts.max(1);
    self
  }

  fn next_delay(&self, attempt: u32) -> Duration {
    let base = self.backoff.delay(attempt);
    if !self.jitter || base.is_zero() {
      return base;
    }
    base.mul_f64(0.5 + rand::random::<f64>() * 0.5)
  }

  /// Run `operation` until it succeeds, fails with a non-retryable error, or
  /// the attempt or wait budget is spent. The operation receives the 1-based
  /// attempt number. The last error is returned unchanged.
  pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
  where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
  {
    let mut attempt = 0;
    let mut waited = Duration::ZERO;

    loop {
      attempt += 1;
      let error = match operation(attempt).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
      };

      if !error.is_retryable() || attempt >= self.max_attempts {
        return Err(error);
      }

      let delay = self.next_delay(attempt);
      if waited + delay > self.max_total_wait {
        warn!(
          attempt,
          waited_ms = waited.as_millis() as u64,
          error = %error,
          "retry_budget_exhausted"
        );
        return Err(error);
      }

      warn!(
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "retry_scheduled"
      );
      tokio::time::sleep(delay).await;
      waited += delay;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;
  use crate::error::CollaboratorError;

  fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
      max_attempts,
      backoff: Backoff::Exponential {
        initial: Duration::from_millis(100),
        max: Duration::from_secs(1),
      },
      jitter: false,
      max_total_wait: Duration::from_secs(10),
    }
  }

  #[test]
  fn test_backoff_schedules() {
    let exp = Backoff::Exponential {
      initial: Duration::from_millis(100),
      max: Duration::from_millis(500),
    };
    assert_eq!(exp.delay(1), Duration::from_millis(100));
    assert_eq!(exp.delay(2), Duration::from_millis(200));
    assert_eq!(exp.delay(3), Duration::from_millis(400));
    assert_eq!(exp.delay(4), Duration::from_millis(500));
    assert_eq!(exp.delay(40), Duration::from_millis(500));

    let linear = Backoff::Linear {
      initial: Duration::from_millis(100),
      max: Duration::from_millis(250),
    };
    assert_eq!(linear.delay(2), Duration::from_millis(200));
    assert_eq!(linear.delay(3), Duration::from_millis(250));

    let constant = Backoff::Constant {
      delay: Duration::from_millis(70),
    };
    assert_eq!(constant.delay(9), Duration::from_millis(70));
  }

  #[test]
  fn test_jitter_stays_within_half_to_full_delay() {
    let policy = RetryPolicy {
      jitter: true,
      ..policy(3)
    };
    for _ in 0..100 {
      let delay = policy.next_delay(2);
      assert!(delay >= Duration::from_millis(100));
      assert!(delay <= Duration::from_millis(200));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_transient_until_success() {
    let attempts = AtomicU32::new(0);

    let value = policy(3)
      .execute(|attempt| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt < 3 {
            Err(CollaboratorError::Transient("503".to_string()))
          } else {
            Ok(attempt)
          }
        }
      })
      .await
      .unwrap();

    assert_eq!(value, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_validation_error_is_not_retried() {
    let attempts = AtomicU32::new(0);

    let err = policy(5)
      .execute(|_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(CollaboratorError::Validation("bad".to_string())) }
      })
      .await
      .unwrap_err();

    assert_eq!(err, CollaboratorError::Validation("bad".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_gives_up_after_max_attempts() {
    let attempts = AtomicU32::new(0);

    let err = policy(2)
      .execute(|_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(CollaboratorError::Transient("down".to_string())) }
      })
      .await
      .unwrap_err();

    assert!(matches!(err, CollaboratorError::Transient(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_total_wait_ceiling_stops_retries() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy {
      max_total_wait: Duration::from_millis(250),
      ..policy(10)
    };

    // Delays would be 100, 200, ... ; the second one breaks the ceiling.
    policy
      .execute(|_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(CollaboratorError::Transient("down".to_string())) }
      })
      .await
      .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_from_settings_maps_backoff_kind() {
    let settings = RetrySettings {
      backoff: RetryBackoff::Constant,
      initial_delay_ms: 50,
      ..RetrySettings::default()
    };
    let policy = RetryPolicy::from_settings(&settings);
    assert_eq!(
      policy.backoff,
      Backoff::Constant {
        delay: Duration::from_millis(50)
      }
    );
  }
}
