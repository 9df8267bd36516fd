//! Append-only record of completed steps in one saga run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SagaContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CompensationState {
  /// Completed and not yet compensated.
  Pending,
  /// The step declares no compensation.
  NotRequired,
  Compensated { at: DateTime<Utc> },
  Failed { error: String, attempts: u32 },
}

impl CompensationState {
  /// Whether the compensation walk should (re)visit this entry.
  pub fn needs_compensation(&self) -> bool {
    matches!(
      self,
      CompensationState::Pending | CompensationState::Failed { .. }
    )
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
  /// Position of the step in its definition.
  pub index: usize,
  pub step_name: String,
  pub output: Value,
  /// Context immediately after the step's output was merged.
  pub context_after: SagaContext,
  pub completed_at: DateTime<Utc>,
  pub compensation: CompensationState,
}

/// Completed steps in execution order. Entries are never removed or
/// reordered; only their compensation state changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepLog {
  entries: Vec<StepLogEntry>,
}

impl StepLog {
  pub(crate) fn append(
    &mut self,
    index: usize,
    step_name: &str,
    output: Value,
    context_after: SagaContext,
    has_compensation: bool,
  ) {
    self.entries.push(StepLogEntry {
      index,
      step_name: step_name.to_string(),
      output,
      context_after,
      completed_at: Utc::now(),
      compensation: if has_compensation {
        CompensationState::Pending
      } else {
        CompensationState::NotRequired
      },
    });
  }

  pub(crate) fn set_compensation(&mut self, position: usize, state: CompensationState) {
    if let Some(entry) = self.entries.get_mut(position) {
      entry.compensation = state;
    }
  }

  pub fn entries(&self) -> &[StepLogEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn completed_steps(&self) -> Vec<&str> {
    self.entries.iter().map(|e| e.step_name.as_str()).collect()
  }

  /// Steps whose compensation ran successfully, in log order.
  pub fn compensated_steps(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .filter(|e| matches!(e.compensation, CompensationState::Compensated { .. }))
      .map(|e| e.step_name.clone())
      .collect()
  }

  /// Steps still awaiting a successful compensation, in log order.
  pub fn uncompensated_steps(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .filter(|e| e.compensation.needs_compensation())
      .map(|e| e.step_name.clone())
      .collect()
  }
}
