use std::collections::HashMap;

use orchestra_config::WorkflowDef;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::{Node, NodeKind};

/// A published workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  pub version: u32,
  pub start_node: String,
  pub nodes: HashMap<String, Node>,
}

impl Workflow {
  /// Resolve and structurally validate a definition.
  ///
  /// Checks, in order: non-empty, unique node ids, known node types, edges
  /// that point at existing nodes, a single entry node, and reachability of
  /// every node from that entry.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    if def.nodes.is_empty() {
      return Err(WorkflowError::Empty);
    }

    let mut nodes = HashMap::with_capacity(def.nodes.len());
    for node in def.nodes {
      if nodes.contains_key(&node.node_id) {
        return Err(WorkflowError::DuplicateNode(node.node_id));
      }
      let kind =
        node
          .node_type
          .parse::<NodeKind>()
          .map_err(|_| WorkflowError::UnknownNodeType {
            node_id: node.node_id.clone(),
            node_type: node.node_type.clone(),
          })?;
      nodes.insert(
        node.node_id.clone(),
        Node {
          node_id: node.node_id,
          kind,
          data: node.data,
          next: node.next,
          collaborator: node.collaborator,
          max_retry_attempts: node.max_retry_attempts,
        },
      );
    }

    for node in nodes.values() {
      for to in &node.next {
        if !nodes.contains_key(to) {
          return Err(WorkflowError::InvalidEdge {
            from: node.node_id.clone(),
            to: to.clone(),
          });
        }
      }
    }

    let start_node = match def.start_node {
      Some(start) if nodes.contains_key(&start) => start,
      Some(start) => return Err(WorkflowError::NodeNotFound(start)),
      None => {
        let mut starts: Vec<String> = nodes
          .values()
          .filter(|n| n.kind == NodeKind::Start)
          .map(|n| n.node_id.clone())
          .collect();
        match starts.len() {
          0 => return Err(WorkflowError::NoEntryNode),
          1 => starts.remove(0),
          _ => {
            starts.sort();
            return Err(WorkflowError::AmbiguousEntryNode { candidates: starts });
          }
        }
      }
    };

    let workflow = Self {
      workflow_id: def.workflow_id,
      name: def.name,
      version: def.version,
      start_node,
      nodes,
    };

    let reachable = workflow.graph().reachable_from(&workflow.start_node);
    let mut unreachable: Vec<&String> = workflow
      .nodes
      .keys()
      .filter(|id| !reachable.contains(*id))
      .collect();
    unreachable.sort();
    if let Some(node_id) = unreachable.first() {
      return Err(WorkflowError::UnreachableNode((*node_id).clone()));
    }

    Ok(workflow)
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes)
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  pub fn node(&self, node_id: &str) -> Result<&Node, WorkflowError> {
    self
      .get_node(node_id)
      .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use orchestra_config::NodeDef;

  use super::*;

  fn node(id: &str, node_type: &str, next: &[&str]) -> NodeDef {
    NodeDef {
      node_id: id.to_string(),
      node_type: node_type.to_string(),
      data: serde_json::json!({}),
      next: next.iter().map(|s| s.to_string()).collect(),
      collaborator: None,
      max_retry_attempts: None,
    }
  }

  fn def(nodes: Vec<NodeDef>) -> WorkflowDef {
    WorkflowDef {
      workflow_id: "wf".to_string(),
      name: "Test".to_string(),
      version: 1,
      start_node: None,
      nodes,
    }
  }

  #[test]
  fn test_publishes_linear_workflow() {
    let workflow = Workflow::from_def(def(vec![
      node("start", "start", &["greet"]),
      node("greet", "send_message", &["end"]),
      node("end", "end", &[]),
    ]))
    .unwrap();

    assert_eq!(workflow.start_node, "start");
    assert_eq!(workflow.node("greet").unwrap().kind, NodeKind::SendMessage);
    assert_eq!(workflow.graph().terminals(), vec!["end"]);
  }

  #[test]
  fn test_unknown_node_type_is_rejected() {
    let err = Workflow::from_def(def(vec![
      node("start", "start", &["tpl"]),
      node("tpl", "whatsapp_template", &[]),
    ]))
    .unwrap_err();

    assert_eq!(
      err,
      WorkflowError::UnknownNodeType {
        node_id: "tpl".to_string(),
        node_type: "whatsapp_template".to_string(),
      }
    );
  }

  #[test]
  fn test_duplicate_node_is_rejected() {
    let err = Workflow::from_def(def(vec![
      node("start", "start", &[]),
      node("start", "end", &[]),
    ]))
    .unwrap_err();
    assert_eq!(err, WorkflowError::DuplicateNode("start".to_string()));
  }

  #[test]
  fn test_edge_to_missing_node_is_rejected() {
    let err = Workflow::from_def(def(vec![node("start", "start", &["nowhere"])])).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidEdge { to, .. } if to == "nowhere"));
  }

  #[test]
  fn test_entry_node_must_be_unambiguous() {
    let err = Workflow::from_def(def(vec![node("a", "end", &[])])).unwrap_err();
    assert_eq!(err, WorkflowError::NoEntryNode);

    let err = Workflow::from_def(def(vec![
      node("b", "start", &[]),
      node("a", "start", &[]),
    ]))
    .unwrap_err();
    assert_eq!(
      err,
      WorkflowError::AmbiguousEntryNode {
        candidates: vec!["a".to_string(), "b".to_string()]
      }
    );
  }

  #[test]
  fn test_explicit_start_node_must_exist() {
    let mut d = def(vec![node("start", "start", &[])]);
    d.start_node = Some("missing".to_string());
    assert_eq!(
      Workflow::from_def(d).unwrap_err(),
      WorkflowError::NodeNotFound("missing".to_string())
    );
  }

  #[test]
  fn test_unreachable_node_is_rejected() {
    let err = Workflow::from_def(def(vec![
      node("start", "start", &["end"]),
      node("end", "end", &[]),
      node("orphan", "send_message", &["end"]),
    ]))
    .unwrap_err();
    assert_eq!(err, WorkflowError::UnreachableNode("orphan".to_string()));
  }

  #[test]
  fn test_cycles_are_allowed() {
    let workflow = Workflow::from_def(def(vec![
      node("start", "start", &["menu"]),
      node("menu", "multiple_choice", &["menu", "end"]),
      node("end", "end", &[]),
    ]))
    .unwrap();

    let graph = workflow.graph();
    assert_eq!(graph.upstream("menu").len(), 2);
    assert_eq!(graph.reachable_from("menu").len(), 2);
  }
}
