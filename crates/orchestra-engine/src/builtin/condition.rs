use std::str::FromStr;

use async_trait::async_trait;
use orchestra_workflow::{Node, NodeKind};
use serde_json::{Value, json};

use crate::builtin::{check_branch, lookup};
use crate::error::NodeError;
use crate::executor::{NodeContext, NodeExecutionResult, NodeExecutor};

/// Comparison used by a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Equals,
  NotEquals,
  GreaterThan,
  LessThan,
  GreaterOrEqual,
  LessOrEqual,
  Contains,
  NotContains,
  Exists,
}

impl FromStr for Operator {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "=" | "==" | "equals" => Operator::Equals,
      "!=" | "not_equals" => Operator::NotEquals,
      ">" | "greater_than" => Operator::GreaterThan,
      "<" | "less_than" => Operator::LessThan,
      ">=" | "greater_or_equal" => Operator::GreaterOrEqual,
      "<=" | "less_or_equal" => Operator::LessOrEqual,
      "contains" => Operator::Contains,
      "not_contains" => Operator::NotContains,
      "exists" => Operator::Exists,
      other => return Err(format!("unknown operator '{other}'")),
    })
  }
}

impl Operator {
  /// Compare `left` (a variable, possibly missing) against `right`.
  pub fn evaluate(&self, left: Option<&Value>, right: &Value) -> bool {
    match self {
      Operator::Exists => left.is_some_and(|v| !v.is_null()),
      Operator::Equals => left.is_some_and(|l| loosely_equal(l, right)),
      Operator::NotEquals => !left.is_some_and(|l| loosely_equal(l, right)),
      Operator::GreaterThan => compare(left, right).is_some_and(|o| o.is_gt()),
      Operator::LessThan => compare(left, right).is_some_and(|o| o.is_lt()),
      Operator::GreaterOrEqual => compare(left, right).is_some_and(|o| o.is_ge()),
      Operator::LessOrEqual => compare(left, right).is_some_and(|o| o.is_le()),
      Operator::Contains => left.is_some_and(|l| contains(l, right)),
      Operator::NotContains => !left.is_some_and(|l| contains(l, right)),
    }
  }
}

fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn as_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Numbers compare numerically even when one side arrived as text.
fn loosely_equal(left: &Value, right: &Value) -> bool {
  if left == right {
    return true;
  }
  match (as_number(left), as_number(right)) {
    (Some(l), Some(r)) => l == r,
    _ => as_text(left) == as_text(right),
  }
}

fn compare(left: Option<&Value>, right: &Value) -> Option<std::cmp::Ordering> {
  let left = left?;
  match (as_number(left), as_number(right)) {
    (Some(l), Some(r)) => l.partial_cmp(&r),
    _ => Some(as_text(left).cmp(&as_text(right))),
  }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
  match haystack {
    Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
    Value::Object(map) => map.contains_key(&as_text(needle)),
    other => as_text(other)
      .to_lowercase()
      .contains(&as_text(needle).to_lowercase()),
  }
}

/// Branches on a comparison against a session variable.
///
/// Data: `{ "variable": path, "operator": op, "value"?: any, "true_next": node_id, "false_next": node_id }`
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::Condition
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    if node.data_str("variable").is_none() {
      return Err("missing 'variable' in node data".to_string());
    }
    node
      .data_str("operator")
      .unwrap_or("equals")
      .parse::<Operator>()?;
    for key in ["true_next", "false_next"] {
      let target = node
        .data_str(key)
        .ok_or_else(|| format!("missing '{key}' in node data"))?;
      check_branch(node, target, key)?;
    }
    Ok(())
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let variable = ctx.require_str("variable")?;
    let operator = ctx
      .data_str("operator")
      .unwrap_or("equals")
      .parse::<Operator>()
      .map_err(NodeError::Validation)?;
    let expected = ctx.data.get("value").cloned().unwrap_or(Value::Null);

    let result = operator.evaluate(lookup(ctx.variables, variable), &expected);
    let next = if result {
      ctx.require_str("true_next")?
    } else {
      ctx.require_str("false_next")?
    };

    Ok(NodeExecutionResult::goto(
      json!({ "condition_result": result }),
      next,
    ))
  }
}
