//! Orchestra Gateway
//!
//! Interfaces to the collaborators outside the process, and HTTP clients that
//! implement them:
//!
//! - [`RemotePlatform`]: create, update and delete resources on the external
//!   marketing platform (campaigns, segment memberships, workspaces, user access)
//! - [`MessageSender`]: deliver a message to a recipient over a connection
//! - [`WebhookCaller`]: arbitrary HTTP calls made by workflow nodes
//!
//! Every failure is reported as a [`CollaboratorError`] so that callers can
//! route it through a circuit breaker and retry policy.

mod http;
mod status;

pub use http::{HttpMessageSender, HttpPlatform, HttpWebhookCaller};
pub use orchestra_resilience::CollaboratorError;
pub use status::classify_status;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resource operations on the external platform.
#[async_trait]
pub trait RemotePlatform: Send + Sync {
  /// Create a resource and return its remote id.
  async fn create_resource(
    &self,
    kind: &str,
    payload: &serde_json::Value,
  ) -> Result<String, CollaboratorError>;

  async fn update_resource(
    &self,
    kind: &str,
    remote_id: &str,
    payload: &serde_json::Value,
  ) -> Result<(), CollaboratorError>;

  /// Delete a resource. A resource that no longer exists is `NotFound`.
  async fn delete_resource(&self, kind: &str, remote_id: &str) -> Result<(), CollaboratorError>;
}

/// Outbound message delivery.
#[async_trait]
pub trait MessageSender: Send + Sync {
  async fn send(
    &self,
    connection_id: &str,
    recipient: &str,
    content: &str,
  ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
  pub status: u16,
  pub body: serde_json::Value,
}

/// Generic HTTP calls issued by workflow nodes.
#[async_trait]
pub trait WebhookCaller: Send + Sync {
  async fn call(&self, request: &WebhookRequest) -> Result<WebhookResponse, CollaboratorError>;
}
