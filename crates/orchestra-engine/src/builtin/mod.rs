//! Executors for the built-in node kinds.

mod condition;
mod control;
mod input;
mod remote;

pub use condition::{ConditionExecutor, Operator};
pub use control::{EndExecutor, SetVariableExecutor, StartExecutor, TransferToHumanExecutor};
pub use input::{CollectInputExecutor, MultipleChoiceExecutor};
pub use remote::{HttpRequestExecutor, SendMessageExecutor};

use orchestra_workflow::Node;
use serde_json::{Map, Value};

/// Check that a branch target named in `data[key]` is a declared successor.
pub(crate) fn check_branch(node: &Node, target: &str, what: &str) -> Result<(), String> {
  if node.has_successor(target) {
    Ok(())
  } else {
    Err(format!(
      "{what} '{target}' is not one of the node's successors [{}]",
      node.next.join(", ")
    ))
  }
}

/// Look up a dotted path such as `order.items.0.sku` in the variables.
pub(crate) fn lookup<'a>(variables: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
  let mut segments = path.split('.');
  let mut current = variables.get(segments.next()?)?;
  for segment in segments {
    current = match current {
      Value::Object(map) => map.get(segment)?,
      Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(current)
}

/// One-key object, the usual shape of a node output.
pub(crate) fn single(key: &str, value: Value) -> Value {
  let mut map = Map::new();
  map.insert(key.to_string(), value);
  Value::Object(map)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_lookup_dotted_paths() {
    let vars = json!({ "order": { "items": [{ "sku": "A1" }] }, "name": "Ada" });
    let vars = vars.as_object().unwrap();

    assert_eq!(lookup(vars, "name"), Some(&json!("Ada")));
    assert_eq!(lookup(vars, "order.items.0.sku"), Some(&json!("A1")));
    assert_eq!(lookup(vars, "order.items.3.sku"), None);
    assert_eq!(lookup(vars, "name.first"), None);
    assert_eq!(lookup(vars, "missing"), None);
  }
}
