//! reqwest-based collaborator clients.

use async_trait::async_trait;
use orchestra_config::CollaboratorSettings;
use orchestra_resilience::CollaboratorError;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;
use tracing::debug;

use crate::status::classify_status;
use crate::{MessageSender, RemotePlatform, WebhookCaller, WebhookRequest, WebhookResponse};

fn transport_error(e: reqwest::Error) -> CollaboratorError {
  if e.is_builder() {
    CollaboratorError::Validation(format!("invalid request: {e}"))
  } else {
    CollaboratorError::Transient(format!("transport error: {e}"))
  }
}

/// Send a request and decode the body. Non-2xx statuses are classified.
async fn send(builder: RequestBuilder) -> Result<(u16, serde_json::Value), CollaboratorError> {
  let response = builder.send().await.map_err(transport_error)?;
  let status = response.status();
  let text = response.text().await.map_err(transport_error)?;

  if !status.is_success() {
    return Err(classify_status(status.as_u16(), &text));
  }

  let body = if text.trim().is_empty() {
    serde_json::Value::Null
  } else {
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
  };
  Ok((status.as_u16(), body))
}

#[derive(Debug, Clone)]
struct Endpoint {
  client: Client,
  base_url: String,
  api_token: Option<String>,
}

impl Endpoint {
  fn new(settings: &CollaboratorSettings) -> Self {
    Self {
      client: Client::new(),
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      api_token: settings.api_token.clone(),
    }
  }

  fn url(&self, segments: &[&str]) -> String {
    let mut url = self.base_url.clone();
    for segment in segments {
      url.push('/');
      url.push_str(segment.trim_matches('/'));
    }
    url
  }

  fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
    let url = self.url(segments);
    debug!(method = %method, url = %url, "collaborator_request");
    let builder = self.client.request(method, url);
    match &self.api_token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }
}

/// HTTP client for the external marketing platform.
///
/// Resources live under `{base_url}/{kind}`; creation answers with a JSON
/// object carrying the new `id`.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
  endpoint: Endpoint,
}

impl HttpPlatform {
  pub fn new(settings: &CollaboratorSettings) -> Self {
    Self {
      endpoint: Endpoint::new(settings),
    }
  }
}

#[async_trait]
impl RemotePlatform for HttpPlatform {
  async fn create_resource(
    &self,
    kind: &str,
    payload: &serde_json::Value,
  ) -> Result<String, CollaboratorError> {
    let (_, body) = send(self.endpoint.request(Method::POST, &[kind]).json(payload)).await?;
    match body.get("id") {
      Some(serde_json::Value::String(id)) => Ok(id.clone()),
      Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
      _ => Err(CollaboratorError::Validation(format!(
        "create {kind}: response has no id"
      ))),
    }
  }

  async fn update_resource(
    &self,
    kind: &str,
    remote_id: &str,
    payload: &serde_json::Value,
  ) -> Result<(), CollaboratorError> {
    send(
      self
        .endpoint
        .request(Method::PATCH, &[kind, remote_id])
        .json(payload),
    )
    .await?;
    Ok(())
  }

  async fn delete_resource(&self, kind: &str, remote_id: &str) -> Result<(), CollaboratorError> {
    send(self.endpoint.request(Method::DELETE, &[kind, remote_id])).await?;
    Ok(())
  }
}

/// HTTP client for the messaging provider.
#[derive(Debug, Clone)]
pub struct HttpMessageSender {
  endpoint: Endpoint,
}

impl HttpMessageSender {
  pub fn new(settings: &CollaboratorSettings) -> Self {
    Self {
      endpoint: Endpoint::new(settings),
    }
  }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
  async fn send(
    &self,
    connection_id: &str,
    recipient: &str,
    content: &str,
  ) -> Result<(), CollaboratorError> {
    let payload = json!({ "recipient": recipient, "content": content });
    send(
      self
        .endpoint
        .request(Method::POST, &["connections", connection_id, "messages"])
        .json(&payload),
    )
    .await?;
    Ok(())
  }
}

/// Issues the HTTP calls described by `http_request` workflow nodes.
#[derive(Debug, Clone, Default)]
pub struct HttpWebhookCaller {
  client: Client,
}

impl HttpWebhookCaller {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl WebhookCaller for HttpWebhookCaller {
  async fn call(&self, request: &WebhookRequest) -> Result<WebhookResponse, CollaboratorError> {
    let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
      .map_err(|_| CollaboratorError::Validation(format!("invalid method '{}'", request.method)))?;

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| CollaboratorError::Validation(format!("invalid header name: {e}")))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| CollaboratorError::Validation(format!("invalid header value: {e}")))?;
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let (status, body) = send(builder).await?;
    Ok(WebhookResponse { status, body })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_url_joins_segments() {
    let endpoint = Endpoint::new(&CollaboratorSettings {
      base_url: "https://platform.example.com/api/".to_string(),
      api_token: None,
    });

    assert_eq!(
      endpoint.url(&["campaigns", "c-1"]),
      "https://platform.example.com/api/campaigns/c-1"
    );
  }

  #[tokio::test]
  async fn test_invalid_method_is_validation_error() {
    let caller = HttpWebhookCaller::new();
    let err = caller
      .call(&WebhookRequest {
        method: "NOT A METHOD".to_string(),
        url: "http://localhost/".to_string(),
        headers: Default::default(),
        body: None,
      })
      .await
      .unwrap_err();

    assert!(matches!(err, CollaboratorError::Validation(_)));
  }

  #[tokio::test]
  async fn test_unreachable_host_is_transient() {
    let platform = HttpPlatform::new(&CollaboratorSettings {
      base_url: "http://127.0.0.1:9".to_string(),
      api_token: Some("token".to_string()),
    });

    let err = platform
      .create_resource("campaigns", &json!({ "name": "Spring" }))
      .await
      .unwrap_err();

    assert!(matches!(err, CollaboratorError::Transient(_)));
  }
}
