use std::collections::{HashMap, HashSet, VecDeque};

use crate::Node;

/// Graph structure for traversal and analysis.
///
/// Cycles are permitted; menus commonly loop back to an earlier node.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from the nodes' declared successors.
  pub fn new(nodes: &HashMap<String, Node>) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node_id in nodes.keys() {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for (from, node) in nodes {
      for to in &node.next {
        adjacency.entry(from.clone()).or_default().push(to.clone());
        reverse_adjacency
          .entry(to.clone())
          .or_default()
          .push(from.clone());
      }
    }

    Self {
      adjacency,
      reverse_adjacency,
    }
  }

  /// Get downstream nodes for a given node.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes with no outgoing edges.
  pub fn terminals(&self) -> Vec<&str> {
    let mut terminals: Vec<&str> = self
      .adjacency
      .iter()
      .filter(|(_, next)| next.is_empty())
      .map(|(id, _)| id.as_str())
      .collect();
    terminals.sort_unstable();
    terminals
  }

  /// Every node reachable from `start`, including `start`.
  pub fn reachable_from(&self, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);

    while let Some(node_id) = queue.pop_front() {
      if !seen.insert(node_id.clone()) {
        continue;
      }
      for next in self.downstream(&node_id) {
        if !seen.contains(next) {
          queue.push_back(next.clone());
        }
      }
    }

    seen
  }
}
