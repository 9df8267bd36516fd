use async_trait::async_trait;
use orchestra_resilience::ProtectedCall;
use orchestra_workflow::{Node, NodeKind};
use serde_json::{Map, Value};

use crate::error::NodeError;

/// How a session proceeds after a node ran. Exactly one holds per result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  /// Move on to `next_node_id`, or the node's default successor. A node
  /// without a successor completes the session.
  Continue,
  /// Park the session at this node until input arrives.
  WaitForInput,
  /// Hand the conversation to a human. Terminal for the engine.
  TransferToHuman,
  /// End the session.
  Complete,
}

/// What a node execution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecutionResult {
  /// Merged into the session variables when it is an object.
  pub output: Value,
  /// Overrides the node's default successor. Must be a declared successor.
  pub next_node_id: Option<String>,
  pub flow: Flow,
}

impl NodeExecutionResult {
  pub fn proceed(output: Value) -> Self {
    Self {
      output,
      next_node_id: None,
      flow: Flow::Continue,
    }
  }

  pub fn goto(output: Value, next_node_id: impl Into<String>) -> Self {
    Self {
      output,
      next_node_id: Some(next_node_id.into()),
      flow: Flow::Continue,
    }
  }

  pub fn wait_for_input(output: Value) -> Self {
    Self {
      output,
      next_node_id: None,
      flow: Flow::WaitForInput,
    }
  }

  pub fn transfer(output: Value) -> Self {
    Self {
      output,
      next_node_id: None,
      flow: Flow::TransferToHuman,
    }
  }

  pub fn complete(output: Value) -> Self {
    Self {
      output,
      next_node_id: None,
      flow: Flow::Complete,
    }
  }
}

/// Everything an executor sees for one node execution.
pub struct NodeContext<'a> {
  pub workflow_id: &'a str,
  pub session_id: &'a str,
  pub node: &'a Node,
  /// The node's data with `{{ }}` placeholders already resolved.
  pub data: &'a Value,
  pub variables: &'a Map<String, Value>,
  /// Inbound input offered to this node, if any.
  pub input: Option<&'a Value>,
  pub(crate) protection: Option<&'a ProtectedCall>,
}

impl<'a> NodeContext<'a> {
  pub fn data_str(&self, key: &str) -> Option<&'a str> {
    self.data.get(key).and_then(Value::as_str)
  }

  pub fn require_str(&self, key: &str) -> Result<&'a str, NodeError> {
    self
      .data_str(key)
      .ok_or_else(|| NodeError::validation(format!("missing '{key}' in node data")))
  }

  /// The input as text. Strings are used as is; other values are rendered
  /// as JSON.
  pub fn input_text(&self) -> Option<String> {
    self.input.map(|input| match input {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    })
  }

  /// The breaker and retry policy guarding this node's collaborator.
  pub fn protection(&self) -> Result<&'a ProtectedCall, NodeError> {
    self.protection.ok_or_else(|| {
      NodeError::Internal(format!(
        "node '{}' calls a collaborator but has no circuit breaker",
        self.node.node_id
      ))
    })
  }
}

/// Executes the nodes of one [`NodeKind`].
#[async_trait]
pub trait NodeExecutor: Send + Sync {
  fn kind(&self) -> NodeKind;

  /// Check the node's raw data at publish time.
  fn validate(&self, node: &Node) -> Result<(), String> {
    let _ = node;
    Ok(())
  }

  /// Whether this executor takes the inbound input. Input offered during a
  /// drive is passed along until a consuming node has run.
  fn consumes_input(&self) -> bool {
    false
  }

  /// Breaker name of the collaborator this node calls, if any.
  fn collaborator(&self, node: &Node) -> Option<String> {
    let _ = node;
    None
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError>;
}
