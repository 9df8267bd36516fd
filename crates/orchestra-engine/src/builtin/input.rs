use async_trait::async_trait;
use orchestra_workflow::{Node, NodeKind};
use regex::Regex;
use serde_json::Value;

use crate::builtin::{check_branch, single};
use crate::error::NodeError;
use crate::executor::{NodeContext, NodeExecutionResult, NodeExecutor};

/// Waits for input and stores it in a variable.
///
/// Data: `{ "variable": string, "pattern"?: regex }`. Input that does not
/// match `pattern` is rejected and the node keeps waiting.
pub struct CollectInputExecutor;

#[async_trait]
impl NodeExecutor for CollectInputExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::CollectInput
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    match node.data_str("variable") {
      Some(v) if !v.trim().is_empty() => {}
      _ => return Err("missing 'variable' in node data".to_string()),
    }
    if let Some(pattern) = node.data_str("pattern") {
      Regex::new(pattern).map_err(|e| format!("invalid 'pattern': {e}"))?;
    }
    Ok(())
  }

  fn consumes_input(&self) -> bool {
    true
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let variable = ctx.require_str("variable")?;
    let (Some(input), Some(text)) = (ctx.input, ctx.input_text()) else {
      return Ok(NodeExecutionResult::wait_for_input(Value::Null));
    };

    if let Some(pattern) = ctx.data_str("pattern") {
      let pattern =
        Regex::new(pattern).map_err(|e| NodeError::validation(format!("invalid 'pattern': {e}")))?;
      if !pattern.is_match(text.trim()) {
        return Ok(NodeExecutionResult::wait_for_input(single(
          "invalid_input",
          Value::String(text),
        )));
      }
    }

    Ok(NodeExecutionResult::proceed(single(variable, input.clone())))
  }
}

/// Presents options and branches on the chosen one.
///
/// Data: `{ "variable"?: string, "options": [{ "label": string, "value"?: any, "next"?: node_id }] }`.
/// Input selects an option by 1-based position, label (case-insensitive) or
/// value. Unrecognized input keeps the node waiting.
pub struct MultipleChoiceExecutor;

const DEFAULT_CHOICE_VARIABLE: &str = "choice";

#[async_trait]
impl NodeExecutor for MultipleChoiceExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::MultipleChoice
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    let options = node
      .data
      .get("options")
      .and_then(Value::as_array)
      .filter(|options| !options.is_empty())
      .ok_or_else(|| "'options' must be a non-empty array".to_string())?;

    for (position, option) in options.iter().enumerate() {
      if option.get("label").and_then(Value::as_str).is_none() {
        return Err(format!("option {} has no 'label'", position + 1));
      }
      if let Some(next) = option.get("next") {
        let next = next
          .as_str()
          .ok_or_else(|| format!("option {} has a non-string 'next'", position + 1))?;
        check_branch(node, next, "option target")?;
      }
    }
    Ok(())
  }

  fn consumes_input(&self) -> bool {
    true
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let Some(text) = ctx.input_text() else {
      return Ok(NodeExecutionResult::wait_for_input(Value::Null));
    };
    let options = ctx
      .data
      .get("options")
      .and_then(Value::as_array)
      .ok_or_else(|| NodeError::validation("'options' must be an array"))?;

    let Some(option) = select(options, text.trim()) else {
      return Ok(NodeExecutionResult::wait_for_input(single(
        "invalid_choice",
        Value::String(text),
      )));
    };

    let variable = ctx.data_str("variable").unwrap_or(DEFAULT_CHOICE_VARIABLE);
    let chosen = option
      .get("value")
      .or_else(|| option.get("label"))
      .cloned()
      .unwrap_or(Value::Null);
    let output = single(variable, chosen);

    match option.get("next").and_then(Value::as_str) {
      Some(next) => Ok(NodeExecutionResult::goto(output, next)),
      None => Ok(NodeExecutionResult::proceed(output)),
    }
  }
}

fn select<'a>(options: &'a [Value], text: &str) -> Option<&'a Value> {
  if let Ok(position) = text.parse::<usize>() {
    if let Some(option) = position.checked_sub(1).and_then(|i| options.get(i)) {
      return Some(option);
    }
  }
  options.iter().find(|option| {
    let label = option.get("label").and_then(Value::as_str);
    let value = option.get("value").map(|v| match v {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    });
    label.is_some_and(|l| l.eq_ignore_ascii_case(text)) || value.as_deref() == Some(text)
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_select_by_position_label_or_value() {
    let options = vec![
      json!({ "label": "Sales", "value": "sales" }),
      json!({ "label": "Support", "value": 2 }),
    ];

    assert_eq!(select(&options, "1"), Some(&options[0]));
    assert_eq!(select(&options, "support"), Some(&options[1]));
    assert_eq!(select(&options, "sales"), Some(&options[0]));
    assert_eq!(select(&options, "2"), Some(&options[1]));
    assert_eq!(select(&options, "0"), None);
    assert_eq!(select(&options, "billing"), None);
  }
}
