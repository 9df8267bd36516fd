use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::SagaContext;
use crate::log::StepLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
  Running,
  Completed,
  Compensating,
  /// Rolled back: every completed step was compensated.
  Compensated,
  /// One or more compensations failed; needs operator attention.
  Failed,
}

impl SagaStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
    )
  }
}

/// The step whose failure triggered compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
  pub index: usize,
  pub step_name: String,
  pub error: String,
}

/// One execution of a saga definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRun {
  pub id: Uuid,
  pub saga_name: String,
  pub context: SagaContext,
  pub status: SagaStatus,
  pub log: StepLog,
  pub failed_step: Option<FailedStep>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

impl SagaRun {
  pub(crate) fn new(saga_name: &str, context: SagaContext) -> Self {
    Self {
      id: Uuid::new_v4(),
      saga_name: saga_name.to_string(),
      context,
      status: SagaStatus::Running,
      log: StepLog::default(),
      failed_step: None,
      started_at: Utc::now(),
      finished_at: None,
    }
  }

  pub(crate) fn finish(&mut self, status: SagaStatus) {
    self.status = status;
    self.finished_at = Some(Utc::now());
  }
}
