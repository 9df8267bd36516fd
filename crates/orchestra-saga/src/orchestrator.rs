use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use chrono::Utc;
use orchestra_resilience::RetryPolicy;
use tracing::{error, info, instrument, warn};

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::{SagaError, SagaFailure, StepError};
use crate::log::CompensationState;
use crate::run::{FailedStep, SagaRun, SagaStatus};

/// Runs saga definitions and compensates them on failure.
///
/// Compensation is sequential and walks the step log in reverse. A failing
/// compensation is recorded and the walk continues with the previous step.
#[derive(Debug, Clone)]
pub struct SagaOrchestrator {
  compensation_retry: RetryPolicy,
}

impl Default for SagaOrchestrator {
  fn default() -> Self {
    Self {
      compensation_retry: RetryPolicy::none(),
    }
  }
}

impl SagaOrchestrator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Retry transient compensation failures with `policy` before recording
  /// them as failed.
  pub fn with_compensation_retry(mut self, policy: RetryPolicy) -> Self {
    self.compensation_retry = policy;
    self
  }

  /// Execute every step in order.
  ///
  /// On success the run is returned with status `Completed`. On a step
  /// failure the completed steps are compensated and the step's error is
  /// returned inside [`SagaError::Failed`], together with the run.
  #[instrument(name = "saga_orchestrate", skip_all, fields(saga_name = %definition.name()))]
  pub async fn run(
    &self,
    definition: &SagaDefinition,
    context: SagaContext,
  ) -> Result<SagaRun, SagaError> {
    definition.validate()?;

    let mut run = SagaRun::new(definition.name(), context);
    info!(
      saga_name = %run.saga_name,
      run_id = %run.id,
      steps = definition.steps().len(),
      "saga_started"
    );

    for (index, step) in definition.steps().iter().enumerate() {
      let started = Instant::now();
      match step.execute(&run.context).await {
        Ok(output) => {
          run.context.merge_output(step.name(), &output);
          let context_after = run.context.clone();
          run
            .log
            .append(index, step.name(), output, context_after, step.has_compensation());
          info!(
            saga_name = %run.saga_name,
            run_id = %run.id,
            step_name = step.name(),
            outcome = "completed",
            duration_ms = started.elapsed().as_millis() as u64,
            "step_completed"
          );
        }
        Err(e) => {
          error!(
            saga_name = %run.saga_name,
            run_id = %run.id,
            step_name = step.name(),
            outcome = "failed",
            duration_ms = started.elapsed().as_millis() as u64,
            error = %e,
            "step_failed"
          );
          run.failed_step = Some(FailedStep {
            index,
            step_name: step.name().to_string(),
            error: e.to_string(),
          });
          return Err(self.abort(definition, run, step.name(), e).await);
        }
      }
    }

    run.finish(SagaStatus::Completed);
    info!(
      saga_name = %run.saga_name,
      run_id = %run.id,
      outcome = "completed",
      "saga_completed"
    );
    Ok(run)
  }

  /// Re-attempt the compensations that failed in an earlier run.
  ///
  /// Entries that were already compensated are left alone. The run becomes
  /// `Compensated` once nothing is left to compensate.
  #[instrument(name = "saga_retry_compensation", skip_all, fields(saga_name = %definition.name(), run_id = %run.id))]
  pub async fn retry_compensation(
    &self,
    definition: &SagaDefinition,
    mut run: SagaRun,
  ) -> Result<SagaRun, SagaError> {
    if run.saga_name != definition.name() {
      return Err(SagaError::DefinitionMismatch {
        run_id: run.id,
        run_saga: run.saga_name,
        saga: definition.name().to_string(),
      });
    }
    if run.status != SagaStatus::Failed {
      return Err(SagaError::NothingToCompensate {
        run_id: run.id,
        status: run.status,
      });
    }

    run.status = SagaStatus::Compensating;
    self.compensate(definition, &mut run).await;
    let status = terminal_status(&run);
    run.finish(status);

    info!(
      saga_name = %run.saga_name,
      run_id = %run.id,
      status = ?status,
      uncompensated = ?run.log.uncompensated_steps(),
      "saga_compensation_retried"
    );
    Ok(run)
  }

  async fn abort(
    &self,
    definition: &SagaDefinition,
    mut run: SagaRun,
    step: &str,
    source: StepError,
  ) -> SagaError {
    run.status = SagaStatus::Compensating;
    info!(
      saga_name = %run.saga_name,
      run_id = %run.id,
      completed_steps = run.log.len(),
      "saga_compensating"
    );

    self.compensate(definition, &mut run).await;
    let status = terminal_status(&run);
    run.finish(status);

    let compensated = run.log.compensated_steps();
    let uncompensated = run.log.uncompensated_steps();
    if uncompensated.is_empty() {
      warn!(
        saga_name = %run.saga_name,
        run_id = %run.id,
        outcome = "compensated",
        "saga_compensated"
      );
    } else {
      error!(
        saga_name = %run.saga_name,
        run_id = %run.id,
        outcome = "failed",
        uncompensated = ?uncompensated,
        "saga_requires_intervention"
      );
    }

    SagaError::Failed(Box::new(SagaFailure {
      saga: run.saga_name.clone(),
      run_id: run.id,
      step: step.to_string(),
      source,
      status,
      compensated,
      uncompensated,
      run,
    }))
  }

  /// Reverse walk over log entries that still need compensating.
  async fn compensate(&self, definition: &SagaDefinition, run: &mut SagaRun) {
    for position in (0..run.log.len()).rev() {
      let entry = &run.log.entries()[position];
      if !entry.compensation.needs_compensation() {
        continue;
      }

      let step_name = entry.step_name.clone();
      let context = entry.context_after.clone();
      let output = entry.output.clone();
      let prior_attempts = match &entry.compensation {
        CompensationState::Failed { attempts, .. } => *attempts,
        _ => 0,
      };
      let step = definition
        .steps()
        .get(entry.index)
        .filter(|s| s.name() == step_name);

      let Some(step) = step else {
        run.log.set_compensation(
          position,
          CompensationState::Failed {
            error: format!(
              "step '{step_name}' is not part of saga '{}'",
              definition.name()
            ),
            attempts: prior_attempts,
          },
        );
        continue;
      };

      let started = Instant::now();
      let attempts = AtomicU32::new(0);
      let result = {
        let step = step.as_ref();
        let context = &context;
        let output = &output;
        let attempts = &attempts;
        self
          .compensation_retry
          .execute(move |attempt| {
            attempts.store(attempt, Ordering::Relaxed);
            step.compensate(context, output)
          })
          .await
      };
      let attempts = prior_attempts + attempts.load(Ordering::Relaxed);
      let duration_ms = started.elapsed().as_millis() as u64;

      let state = match result {
        Ok(()) => {
          info!(
            saga_name = %run.saga_name,
            run_id = %run.id,
            step_name = %step_name,
            outcome = "compensated",
            duration_ms,
            "step_compensated"
          );
          CompensationState::Compensated { at: Utc::now() }
        }
        Err(e) => {
          warn!(
            saga_name = %run.saga_name,
            run_id = %run.id,
            step_name = %step_name,
            outcome = "compensation_failed",
            duration_ms,
            attempts,
            error = %e,
            "compensation_failed"
          );
          CompensationState::Failed {
            error: e.to_string(),
            attempts,
          }
        }
      };
      run.log.set_compensation(position, state);
    }
  }
}

fn terminal_status(run: &SagaRun) -> SagaStatus {
  if run.log.uncompensated_steps().is_empty() {
    SagaStatus::Compensated
  } else {
    SagaStatus::Failed
  }
}
