use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use orchestra_gateway::{MessageSender, WebhookCaller, WebhookRequest};
use orchestra_workflow::{Node, NodeKind};
use serde_json::{Value, json};

use crate::builtin::{lookup, single};
use crate::error::NodeError;
use crate::executor::{NodeContext, NodeExecutionResult, NodeExecutor};

const MESSAGING: &str = "messaging";
const WEBHOOK: &str = "webhook";

/// Sends a message to the session's contact.
///
/// Data: `{ "text": string, "recipient"?: string, "connection_id"?: string }`.
/// Recipient and connection fall back to the `recipient` and
/// `connection_id` session variables.
pub struct SendMessageExecutor {
  messages: Arc<dyn MessageSender>,
}

impl SendMessageExecutor {
  pub fn new(messages: Arc<dyn MessageSender>) -> Self {
    Self { messages }
  }
}

fn from_data_or_vars<'a>(ctx: &NodeContext<'a>, key: &str) -> Option<&'a str> {
  ctx
    .data_str(key)
    .or_else(|| lookup(ctx.variables, key).and_then(Value::as_str))
}

#[async_trait]
impl NodeExecutor for SendMessageExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::SendMessage
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    match node.data_str("text") {
      Some(text) if !text.trim().is_empty() => Ok(()),
      _ => Err("missing 'text' in node data".to_string()),
    }
  }

  fn collaborator(&self, node: &Node) -> Option<String> {
    Some(node.collaborator.clone().unwrap_or_else(|| MESSAGING.to_string()))
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let text = ctx.require_str("text")?;
    let recipient = from_data_or_vars(ctx, "recipient")
      .ok_or_else(|| NodeError::validation("no recipient in node data or variables"))?;
    let connection_id = from_data_or_vars(ctx, "connection_id").unwrap_or("default");

    let messages = self.messages.as_ref();
    ctx
      .protection()?
      .call(|| messages.send(connection_id, recipient, text))
      .await?;

    Ok(NodeExecutionResult::proceed(single(
      "last_message",
      Value::String(text.to_string()),
    )))
  }
}

/// Calls an HTTP endpoint and stores the response.
///
/// Data: `{ "url": string, "method"?: string, "headers"?: object, "body"?: any, "save_as"?: string }`
pub struct HttpRequestExecutor {
  webhooks: Arc<dyn WebhookCaller>,
}

impl HttpRequestExecutor {
  pub fn new(webhooks: Arc<dyn WebhookCaller>) -> Self {
    Self { webhooks }
  }
}

const METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
  fn kind(&self) -> NodeKind {
    NodeKind::HttpRequest
  }

  fn validate(&self, node: &Node) -> Result<(), String> {
    if node.data_str("url").is_none_or(|url| url.trim().is_empty()) {
      return Err("missing 'url' in node data".to_string());
    }
    if let Some(method) = node.data_str("method") {
      if !METHODS.contains(&method.to_ascii_uppercase().as_str()) {
        return Err(format!("unsupported method '{method}'"));
      }
    }
    if node.data.get("headers").is_some_and(|h| !h.is_object()) {
      return Err("'headers' must be an object".to_string());
    }
    Ok(())
  }

  fn collaborator(&self, node: &Node) -> Option<String> {
    Some(node.collaborator.clone().unwrap_or_else(|| WEBHOOK.to_string()))
  }

  async fn execute(&self, ctx: &NodeContext<'_>) -> Result<NodeExecutionResult, NodeError> {
    let headers: BTreeMap<String, String> = ctx
      .data
      .get("headers")
      .and_then(Value::as_object)
      .map(|headers| {
        headers
          .iter()
          .map(|(name, value)| {
            let value = match value {
              Value::String(s) => s.clone(),
              other => other.to_string(),
            };
            (name.clone(), value)
          })
          .collect()
      })
      .unwrap_or_default();

    let request = WebhookRequest {
      method: ctx.data_str("method").unwrap_or("GET").to_ascii_uppercase(),
      url: ctx.require_str("url")?.to_string(),
      headers,
      body: ctx.data.get("body").cloned(),
    };

    let webhooks = self.webhooks.as_ref();
    let response = ctx
      .protection()?
      .call(|| webhooks.call(&request))
      .await?;

    let save_as = ctx.data_str("save_as").unwrap_or("http_response");
    Ok(NodeExecutionResult::proceed(single(
      save_as,
      json!({ "status": response.status, "body": response.body }),
    )))
  }
}
