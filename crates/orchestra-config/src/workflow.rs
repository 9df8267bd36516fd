use serde::{Deserialize, Serialize};

use crate::node::NodeDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_id: String,
  pub name: String,
  #[serde(default = "default_version")]
  pub version: u32,
  /// Entry node. When absent the single `start` node is used.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_node: Option<String>,
  pub nodes: Vec<NodeDef>,
}

fn default_version() -> u32 {
  1
}
