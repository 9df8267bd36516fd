use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("workflow has no nodes")]
  Empty,

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("node '{node_id}' has unknown node type '{node_type}'")]
  UnknownNodeType { node_id: String, node_type: String },

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("no entry node: set start_node or add a single 'start' node")]
  NoEntryNode,

  #[error("ambiguous entry node, candidates: {}", candidates.join(", "))]
  AmbiguousEntryNode { candidates: Vec<String> },

  #[error("node '{0}' is not reachable from the entry node")]
  UnreachableNode(String),
}
