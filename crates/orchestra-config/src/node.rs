use serde::{Deserialize, Serialize};

/// A node as authored in a workflow definition.
///
/// `node_type` is kept as a plain string here; it is checked against the
/// closed set of node kinds when the workflow is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(rename = "type")]
  pub node_type: String,
  /// Node-specific configuration. String values may contain `{{ var }}`
  /// placeholders that are interpolated before the node executes.
  #[serde(default = "empty_object")]
  pub data: serde_json::Value,
  /// Declared successors. The first entry is the default edge.
  #[serde(default)]
  pub next: Vec<String>,
  /// Collaborator name used for circuit breaker protection, overriding the
  /// default collaborator of the node type.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub collaborator: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
}

fn empty_object() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}
