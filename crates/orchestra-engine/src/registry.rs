use std::collections::HashMap;
use std::sync::Arc;

use orchestra_gateway::{MessageSender, WebhookCaller};
use orchestra_workflow::NodeKind;
use tracing::debug;

use crate::builtin;
use crate::executor::NodeExecutor;

/// Maps each node kind to the executor responsible for it.
#[derive(Clone, Default)]
pub struct NodeRegistry {
  executors: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding an executor for every built-in node kind.
  pub fn with_builtins(messages: Arc<dyn MessageSender>, webhooks: Arc<dyn WebhookCaller>) -> Self {
    let mut registry = Self::new();
    registry.register(builtin::StartExecutor);
    registry.register(builtin::SendMessageExecutor::new(messages));
    registry.register(builtin::CollectInputExecutor);
    registry.register(builtin::MultipleChoiceExecutor);
    registry.register(builtin::ConditionExecutor);
    registry.register(builtin::SetVariableExecutor);
    registry.register(builtin::HttpRequestExecutor::new(webhooks));
    registry.register(builtin::TransferToHumanExecutor);
    registry.register(builtin::EndExecutor);
    registry
  }

  /// Register an executor, replacing any executor for the same kind.
  pub fn register(&mut self, executor: impl NodeExecutor + 'static) {
    let kind = executor.kind();
    debug!(node_type = %kind, "executor_registered");
    self.executors.insert(kind, Arc::new(executor));
  }

  pub fn resolve(&self, kind: NodeKind) -> Option<Arc<dyn NodeExecutor>> {
    self.executors.get(&kind).cloned()
  }

  pub fn kinds(&self) -> Vec<NodeKind> {
    NodeKind::ALL
      .into_iter()
      .filter(|kind| self.executors.contains_key(kind))
      .collect()
  }
}
