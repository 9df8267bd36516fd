use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StepError;

/// Free-form key/value context threaded through a saga run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaContext(Map<String, Value>);

impl SagaContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a context from a JSON object. Anything else yields an empty context.
  pub fn from_value(value: Value) -> Self {
    match value {
      Value::Object(map) => Self(map),
      _ => Self::default(),
    }
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.0.get(key).and_then(Value::as_str)
  }

  /// A string the step cannot run without.
  pub fn require_str(&self, key: &str) -> Result<&str, StepError> {
    self
      .get_str(key)
      .ok_or_else(|| StepError::Validation(format!("missing context value '{key}'")))
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  /// Merge a step output. Object outputs merge key by key; any other
  /// non-null output is stored under the step name.
  pub fn merge_output(&mut self, step_name: &str, output: &Value) {
    match output {
      Value::Object(map) => {
        for (key, value) in map {
          self.0.insert(key.clone(), value.clone());
        }
      }
      Value::Null => {}
      other => {
        self.0.insert(step_name.to_string(), other.clone());
      }
    }
  }

  pub fn as_map(&self) -> &Map<String, Value> {
    &self.0
  }

  pub fn into_value(self) -> Value {
    Value::Object(self.0)
  }
}

impl From<Map<String, Value>> for SagaContext {
  fn from(map: Map<String, Value>) -> Self {
    Self(map)
  }
}
