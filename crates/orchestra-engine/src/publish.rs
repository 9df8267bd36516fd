use std::collections::HashMap;
use std::sync::Arc;

use orchestra_config::WorkflowDef;
use orchestra_resilience::{BreakerRegistry, ProtectedCall, RetryPolicy};
use orchestra_workflow::Workflow;
use tracing::{info, warn};

use crate::error::{NodeIssue, PublishError};
use crate::executor::NodeExecutor;
use crate::registry::NodeRegistry;

/// A workflow bound to its executors and breakers, ready to run.
///
/// Executors and protection are resolved once, at publish time, so no
/// session can reach a node the engine does not know how to execute.
pub struct PublishedWorkflow {
  workflow: Workflow,
  executors: HashMap<String, Arc<dyn NodeExecutor>>,
  protection: HashMap<String, ProtectedCall>,
}

impl std::fmt::Debug for PublishedWorkflow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PublishedWorkflow")
      .field("workflow", &self.workflow)
      .field("executors", &self.executors.keys().collect::<Vec<_>>())
      .field("protection", &self.protection)
      .finish()
  }
}

impl PublishedWorkflow {
  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  pub fn workflow_id(&self) -> &str {
    &self.workflow.workflow_id
  }

  pub(crate) fn executor(&self, node_id: &str) -> Option<&Arc<dyn NodeExecutor>> {
    self.executors.get(node_id)
  }

  pub(crate) fn protection(&self, node_id: &str) -> Option<&ProtectedCall> {
    self.protection.get(node_id)
  }
}

/// Validates workflow definitions against the executors and breakers
/// available in this process.
#[derive(Clone)]
pub struct Publisher {
  registry: Arc<NodeRegistry>,
  breakers: Arc<BreakerRegistry>,
  retry: RetryPolicy,
}

impl Publisher {
  pub fn new(registry: Arc<NodeRegistry>, breakers: Arc<BreakerRegistry>, retry: RetryPolicy) -> Self {
    Self {
      registry,
      breakers,
      retry,
    }
  }

  /// Validate `def` and bind every node to its executor.
  ///
  /// Structural errors are reported first. Otherwise every node is checked
  /// and all problems are reported together.
  pub fn publish(&self, def: WorkflowDef) -> Result<PublishedWorkflow, PublishError> {
    let workflow = Workflow::from_def(def)?;

    let mut node_ids: Vec<&String> = workflow.nodes.keys().collect();
    node_ids.sort();

    let mut issues = Vec::new();
    let mut executors = HashMap::new();
    let mut protection = HashMap::new();

    for node_id in node_ids {
      let node = &workflow.nodes[node_id];
      let issue = |message: String| NodeIssue {
        node_id: node_id.clone(),
        message,
      };

      let Some(executor) = self.registry.resolve(node.kind) else {
        issues.push(issue(format!(
          "no executor registered for node type '{}'",
          node.kind
        )));
        continue;
      };

      if let Err(message) = executor.validate(node) {
        issues.push(issue(message));
      }

      if let Some(name) = executor.collaborator(node) {
        match self.breakers.get(&name) {
          Ok(breaker) => {
            let mut retry = self.retry.clone();
            if let Some(attempts) = node.max_retry_attempts {
              retry = retry.with_max_attempts(attempts);
            }
            protection.insert(node_id.clone(), ProtectedCall::new(breaker, retry));
          }
          Err(e) => issues.push(issue(e.to_string())),
        }
      }

      executors.insert(node_id.clone(), executor);
    }

    if !issues.is_empty() {
      warn!(
        workflow_id = %workflow.workflow_id,
        issues = issues.len(),
        "workflow_rejected"
      );
      return Err(PublishError::Nodes {
        workflow_id: workflow.workflow_id,
        issues,
      });
    }

    info!(
      workflow_id = %workflow.workflow_id,
      version = workflow.version,
      nodes = workflow.nodes.len(),
      protected_nodes = protection.len(),
      "workflow_published"
    );

    Ok(PublishedWorkflow {
      workflow,
      executors,
      protection,
    })
  }
}
