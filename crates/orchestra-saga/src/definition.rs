use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::SagaError;
use crate::step::SagaStep;

/// An ordered, named list of steps for one business process.
///
/// Names are fully qualified by domain, e.g. `campaigns.create_campaign`.
#[derive(Clone)]
pub struct SagaDefinition {
  name: String,
  steps: Vec<Arc<dyn SagaStep>>,
}

impl SagaDefinition {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      steps: Vec::new(),
    }
  }

  pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
    self.steps.push(Arc::new(step));
    self
  }

  pub fn push(&mut self, step: Arc<dyn SagaStep>) {
    self.steps.push(step);
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn steps(&self) -> &[Arc<dyn SagaStep>] {
    &self.steps
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name()).collect()
  }

  /// Reject empty definitions and duplicate step names.
  pub fn validate(&self) -> Result<(), SagaError> {
    let invalid = |message: String| SagaError::InvalidDefinition {
      saga: self.name.clone(),
      message,
    };

    if self.name.trim().is_empty() {
      return Err(invalid("saga name is empty".to_string()));
    }
    if self.steps.is_empty() {
      return Err(invalid("saga has no steps".to_string()));
    }

    let mut seen = HashSet::new();
    for step in &self.steps {
      if !seen.insert(step.name()) {
        return Err(invalid(format!("duplicate step name '{}'", step.name())));
      }
    }
    Ok(())
  }
}

impl fmt::Debug for SagaDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SagaDefinition")
      .field("name", &self.name)
      .field("steps", &self.step_names())
      .finish()
  }
}
