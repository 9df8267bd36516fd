use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of node types a workflow may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Start,
  SendMessage,
  CollectInput,
  MultipleChoice,
  Condition,
  SetVariable,
  HttpRequest,
  TransferToHuman,
  End,
}

impl NodeKind {
  pub const ALL: [NodeKind; 9] = [
    NodeKind::Start,
    NodeKind::SendMessage,
    NodeKind::CollectInput,
    NodeKind::MultipleChoice,
    NodeKind::Condition,
    NodeKind::SetVariable,
    NodeKind::HttpRequest,
    NodeKind::TransferToHuman,
    NodeKind::End,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Start => "start",
      NodeKind::SendMessage => "send_message",
      NodeKind::CollectInput => "collect_input",
      NodeKind::MultipleChoice => "multiple_choice",
      NodeKind::Condition => "condition",
      NodeKind::SetVariable => "set_variable",
      NodeKind::HttpRequest => "http_request",
      NodeKind::TransferToHuman => "transfer_to_human",
      NodeKind::End => "end",
    }
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for NodeKind {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    NodeKind::ALL
      .into_iter()
      .find(|kind| kind.as_str() == s)
      .ok_or(())
  }
}

/// A node in a published workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub kind: NodeKind,
  pub data: serde_json::Value,
  pub next: Vec<String>,
  pub collaborator: Option<String>,
  pub max_retry_attempts: Option<u32>,
}

impl Node {
  /// The static successor used when an executor does not pick one.
  pub fn default_next(&self) -> Option<&str> {
    self.next.first().map(String::as_str)
  }

  pub fn has_successor(&self, node_id: &str) -> bool {
    self.next.iter().any(|n| n == node_id)
  }

  /// String field of `data`, if present.
  pub fn data_str(&self, key: &str) -> Option<&str> {
    self.data.get(key).and_then(|v| v.as_str())
  }
}
