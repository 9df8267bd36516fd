//! Variable interpolation for node data.
//!
//! Every string in a node's data may contain `{{ expression }}` placeholders.
//! Each expression is evaluated by minijinja against the session variables,
//! so dotted paths and filters work:
//!
//! ```json
//! { "text": "Hello {{ name | title }}, your order {{ order.id }} shipped" }
//! ```
//!
//! A placeholder that does not resolve is left in the text verbatim. Undefined
//! values are strict, so `{{ missing | upper }}` does not resolve either; use
//! `default(...)` to supply a fallback. A string that is exactly one
//! placeholder takes the resolved value's JSON type.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Resolves placeholders against session variables.
pub struct Interpolator {
  env: Environment<'static>,
}

impl Default for Interpolator {
  fn default() -> Self {
    Self::new()
  }
}

impl Interpolator {
  pub fn new() -> Self {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    Self { env }
  }

  /// Resolve every string inside `value`.
  pub fn interpolate(&self, value: &Value, variables: &Map<String, Value>) -> Value {
    match value {
      Value::String(s) => self.interpolate_str(s, variables),
      Value::Array(items) => Value::Array(
        items
          .iter()
          .map(|item| self.interpolate(item, variables))
          .collect(),
      ),
      Value::Object(map) => Value::Object(
        map
          .iter()
          .map(|(key, item)| (key.clone(), self.interpolate(item, variables)))
          .collect(),
      ),
      other => other.clone(),
    }
  }

  fn interpolate_str(&self, text: &str, variables: &Map<String, Value>) -> Value {
    if let Some(expr) = sole_placeholder(text) {
      if let Some(resolved) = self.evaluate(expr, variables) {
        return resolved;
      }
      return Value::String(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
      let after_open = &rest[start + OPEN.len()..];
      let Some(end) = after_open.find(CLOSE) else {
        break;
      };
      out.push_str(&rest[..start]);
      let placeholder = &rest[start..start + OPEN.len() + end + CLOSE.len()];
      match self.evaluate(&after_open[..end], variables) {
        Some(resolved) => out.push_str(&render(&resolved)),
        None => out.push_str(placeholder),
      }
      rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    Value::String(out)
  }

  /// `None` when the expression is invalid or refers to something undefined.
  fn evaluate(&self, expr: &str, variables: &Map<String, Value>) -> Option<Value> {
    let expr = expr.trim();
    if expr.is_empty() {
      return None;
    }
    let compiled = self.env.compile_expression(expr).ok()?;
    let value = compiled.eval(variables).ok()?;
    if value.is_undefined() {
      return None;
    }
    serde_json::to_value(&value).ok()
  }
}

/// The expression of a string that consists of a single placeholder.
fn sole_placeholder(text: &str) -> Option<&str> {
  let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
  if inner.contains(OPEN) || inner.contains(CLOSE) {
    return None;
  }
  Some(inner)
}

fn render(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn vars(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn test_resolves_paths_and_filters() {
    let interpolator = Interpolator::new();
    let variables = vars(json!({ "name": "ada lovelace", "order": { "id": 42 } }));

    let resolved = interpolator.interpolate(
      &json!({ "text": "Hi {{ name | title }}, order {{order.id}} shipped" }),
      &variables,
    );

    assert_eq!(resolved["text"], "Hi Ada Lovelace, order 42 shipped");
  }

  #[test]
  fn test_unresolved_placeholders_stay_verbatim() {
    let interpolator = Interpolator::new();
    let variables = vars(json!({ "name": "Ada" }));

    let resolved = interpolator.interpolate(
      &json!("{{ name }} owes {{ balance }} and {{ missing.field }}"),
      &variables,
    );
    assert_eq!(resolved, "Ada owes {{ balance }} and {{ missing.field }}");

    let sole = interpolator.interpolate(&json!("{{ balance }}"), &variables);
    assert_eq!(sole, "{{ balance }}");

    assert_eq!(
      interpolator.interpolate(&json!("Hi {{ missing | upper }}!"), &variables),
      "Hi {{ missing | upper }}!"
    );
    assert_eq!(
      interpolator.interpolate(&json!("Hi {{ missing ~ 'x' }}!"), &variables),
      "Hi {{ missing ~ 'x' }}!"
    );
    assert_eq!(
      interpolator.interpolate(&json!("{{ missing | title }}"), &variables),
      "{{ missing | title }}"
    );
  }

  #[test]
  fn test_default_filter_supplies_fallback() {
    let interpolator = Interpolator::new();
    let variables = vars(json!({ "name": "Ada" }));

    let resolved = interpolator.interpolate(
      &json!("Hi {{ nickname | default('friend') }}, {{ name is defined }}"),
      &variables,
    );
    assert_eq!(resolved, "Hi friend, true");
  }

  #[test]
  fn test_sole_placeholder_keeps_type() {
    let interpolator = Interpolator::new();
    let variables = vars(json!({ "age": 36, "tags": ["vip"], "ok": true }));

    let resolved = interpolator.interpolate(
      &json!({ "age": "{{ age }}", "tags": " {{ tags }} ", "flags": ["{{ ok }}"] }),
      &variables,
    );

    assert_eq!(resolved, json!({ "age": 36, "tags": ["vip"], "flags": [true] }));
  }

  #[test]
  fn test_unterminated_and_invalid_placeholders() {
    let interpolator = Interpolator::new();
    let variables = Map::new();

    assert_eq!(
      interpolator.interpolate(&json!("open {{ name"), &variables),
      "open {{ name"
    );
    assert_eq!(
      interpolator.interpolate(&json!("bad {{ 1 + }} syntax"), &variables),
      "bad {{ 1 + }} syntax"
    );
    assert_eq!(
      interpolator.interpolate(&json!("empty {{}}"), &variables),
      "empty {{}}"
    );
  }

  #[test]
  fn test_non_strings_pass_through() {
    let interpolator = Interpolator::new();
    let value = json!({ "n": 1, "b": false, "z": null });
    assert_eq!(interpolator.interpolate(&value, &Map::new()), value);
  }
}
