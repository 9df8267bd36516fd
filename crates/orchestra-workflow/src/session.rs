use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

/// Status of a workflow session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Running,
  WaitingForInput,
  Transferred,
  Completed,
  Failed,
}

impl SessionStatus {
  /// No further node will run for a session in a terminal status.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      SessionStatus::Transferred | SessionStatus::Completed | SessionStatus::Failed
    )
  }
}

/// Where and why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
  pub node_id: String,
  pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
  Continued,
  WaitingForInput,
  Transferred,
  Completed,
  Failed,
}

/// One node execution in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeVisit {
  pub node_id: String,
  pub outcome: VisitOutcome,
  pub at: DateTime<Utc>,
}

/// One live traversal of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSession {
  pub session_id: String,
  pub workflow_id: String,
  pub workflow_version: u32,
  pub current_node_id: String,
  pub variables: serde_json::Map<String, serde_json::Value>,
  pub status: SessionStatus,
  pub failure: Option<SessionFailure>,
  pub history: Vec<NodeVisit>,
  pub steps_taken: u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl WorkflowSession {
  /// Create a running session positioned at the workflow's entry node.
  pub fn new(workflow: &Workflow, variables: serde_json::Map<String, serde_json::Value>) -> Self {
    let now = Utc::now();
    Self {
      session_id: uuid::Uuid::new_v4().to_string(),
      workflow_id: workflow.workflow_id.clone(),
      workflow_version: workflow.version,
      current_node_id: workflow.start_node.clone(),
      variables,
      status: SessionStatus::Running,
      failure: None,
      history: Vec::new(),
      steps_taken: 0,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Record a node execution and move the session to the matching status.
  pub fn record_visit(&mut self, node_id: &str, outcome: VisitOutcome) {
    let now = Utc::now();
    self.history.push(NodeVisit {
      node_id: node_id.to_string(),
      outcome,
      at: now,
    });
    self.steps_taken += 1;
    self.updated_at = now;
    self.status = match outcome {
      VisitOutcome::Continued => SessionStatus::Running,
      VisitOutcome::WaitingForInput => SessionStatus::WaitingForInput,
      VisitOutcome::Transferred => SessionStatus::Transferred,
      VisitOutcome::Completed => SessionStatus::Completed,
      VisitOutcome::Failed => SessionStatus::Failed,
    };
  }

  /// Mark the session failed at `node_id`.
  pub fn fail(&mut self, node_id: &str, error: impl Into<String>) {
    self.failure = Some(SessionFailure {
      node_id: node_id.to_string(),
      error: error.into(),
    });
    self.record_visit(node_id, VisitOutcome::Failed);
  }

  /// Merge an object output into the session variables. Other values are
  /// stored under `last_output`.
  pub fn merge_output(&mut self, output: &serde_json::Value) {
    match output {
      serde_json::Value::Object(map) => {
        for (key, value) in map {
          self.variables.insert(key.clone(), value.clone());
        }
      }
      serde_json::Value::Null => {}
      other => {
        self
          .variables
          .insert("last_output".to_string(), other.clone());
      }
    }
  }
}
