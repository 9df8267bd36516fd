use async_trait::async_trait;
use orchestra_workflow::{Node, NodeKind};
use serde_json::{Map, Value};

use crate::builtin::single;
use crate::error::NodeError;
use crate::executor::{NodeContext, NodeExecutionResult, NodeExecutor};

/// Entry node. Passes straight through to its successor.
pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::Start
  }

  async fn execute(&self, _ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    Ok(NodeExecutionResult::proceed(Value::Null))
  }
}

/// Completes the session. An optional `output` object is merged into the
/// variables first.
pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::End
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    if !node.next.is_empty() {
      return Err("an end node cannot have successors".to_string());
    }
    Ok(())
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let output = ctx.data.get("output").cloned().unwrap_or(Value::Null);
    Ok(NodeExecutionResult::complete(output))
  }
}

/// Hands the session to a human agent.
///
/// Data: `{ "queue"?: string, "reason"?: string }`
pub struct TransferToHumanExecutor;

#[async_trait]
impl NodeExecutor for TransferToHumanExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::TransferToHuman
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let mut output = Map::new();
    output.insert(
      "transfer_queue".to_string(),
      Value::String(ctx.data_str("queue").unwrap_or("default").to_string()),
    );
    if let Some(reason) = ctx.data_str("reason") {
      output.insert("transfer_reason".to_string(), Value::String(reason.to_string()));
    }
    Ok(NodeExecutionResult::transfer(Value::Object(output)))
  }
}

/// Sets session variables.
///
/// Data: `{ "variables": { name: value, ... } }` or `{ "name": string, "value": any }`
pub struct SetVariableExecutor;

#[async_trait]
impl NodeExecutor for SetVariableExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::SetVariable
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    match (node.data.get("variables"), node.data_str("name")) {
      (Some(Value::Object(_)), _) => Ok(()),
      (Some(_), _) => Err("'variables' must be an object".to_string()),
      (None, Some(name)) if !name.trim().is_empty() => Ok(()),
      _ => Err("expected 'variables' or 'name' in node data".to_string()),
    }
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    if let Some(Value::Object(variables)) = ctx.data.get("variables") {
      return Ok(NodeExecutionResult::proceed(Value::Object(variables.clone())));
    }
    let name = ctx.require_str("name")?;
    let value = ctx.data.get("value").cloned().unwrap_or(Value::Null);
    Ok(NodeExecutionResult::proceed(single(name, value)))
  }
}
