use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchestra_config::{EngineSettings, NodeDef, WorkflowDef};
use orchestra_engine::{
  ChannelNotifier, EngineError, ExecutionEngine, ExecutionEvent, NodeRegistry, PublishError,
  PublishedWorkflow, Publisher, StartExecutor,
};
use orchestra_gateway::{
  CollaboratorError, MessageSender, WebhookCaller, WebhookRequest, WebhookResponse,
};
use orchestra_resilience::{BreakerConfig, BreakerRegistry, RetryPolicy};
use orchestra_store::MemoryStore;
use orchestra_workflow::{SessionStatus, WorkflowError};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
struct Sent {
  connection_id: String,
  recipient: String,
  content: String,
}

#[derive(Default)]
struct RecordingSender {
  sent: Mutex<Vec<Sent>>,
  attempts: Mutex<u32>,
  failure: Mutex<Option<CollaboratorError>>,
}

impl RecordingSender {
  fn failing(error: CollaboratorError) -> Self {
    let sender = Self::default();
    *sender.failure.lock() = Some(error);
    sender
  }

  fn contents(&self) -> Vec<String> {
    self.sent.lock().iter().map(|s| s.content.clone()).collect()
  }
}

#[async_trait]
impl MessageSender for RecordingSender {
  async fn send(
    &self,
    connection_id: &str,
    recipient: &str,
    content: &str,
  ) -> Result<(), CollaboratorError> {
    *self.attempts.lock() += 1;
    if let Some(error) = self.failure.lock().clone() {
      return Err(error);
    }
    self.sent.lock().push(Sent {
      connection_id: connection_id.to_string(),
      recipient: recipient.to_string(),
      content: content.to_string(),
    });
    Ok(())
  }
}

#[derive(Default)]
struct FakeWebhook {
  requests: Mutex<Vec<WebhookRequest>>,
}

#[async_trait]
impl WebhookCaller for FakeWebhook {
  async fn call(&self, request: &WebhookRequest) -> Result<WebhookResponse, CollaboratorError> {
    self.requests.lock().push(request.clone());
    Ok(WebhookResponse {
      status: 200,
      body: json!({ "tier": "gold" }),
    })
  }
}

struct Harness {
  store: MemoryStore,
  sender: Arc<RecordingSender>,
  webhook: Arc<FakeWebhook>,
  publisher: Publisher,
}

impl Harness {
  fn new() -> Self {
    Self::with_sender(RecordingSender::default(), 5)
  }

  fn with_sender(sender: RecordingSender, failure_threshold: u32) -> Self {
    let sender = Arc::new(sender);
    let webhook = Arc::new(FakeWebhook::default());
    let registry = NodeRegistry::with_builtins(sender.clone(), webhook.clone());

    let breaker = |name| {
      BreakerConfig::new(
        name,
        failure_threshold,
        Duration::from_secs(60),
        Duration::from_secs(5),
      )
      .unwrap()
    };
    let breakers = BreakerRegistry::builder()
      .register("messaging", breaker("messaging"))
      .unwrap()
      .register("webhook", breaker("webhook"))
      .unwrap()
      .build();

    Self {
      store: MemoryStore::new(),
      sender,
      webhook,
      publisher: Publisher::new(Arc::new(registry), Arc::new(breakers), RetryPolicy::none()),
    }
  }

  fn engine(&self) -> ExecutionEngine {
    ExecutionEngine::new(Arc::new(self.store.clone()), EngineSettings::default())
  }

  fn publish(&self, nodes: Vec<NodeDef>) -> PublishedWorkflow {
    self.publisher.publish(workflow(nodes)).unwrap()
  }
}

fn node(id: &str, node_type: &str, data: Value, next: &[&str]) -> NodeDef {
  NodeDef {
    node_id: id.to_string(),
    node_type: node_type.to_string(),
    data,
    next: next.iter().map(|n| n.to_string()).collect(),
    collaborator: None,
    max_retry_attempts: None,
  }
}

fn workflow(nodes: Vec<NodeDef>) -> WorkflowDef {
  WorkflowDef {
    workflow_id: "support-bot".to_string(),
    name: "Support bot".to_string(),
    version: 1,
    start_node: None,
    nodes,
  }
}

fn vars(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

fn greeting_flow() -> Vec<NodeDef> {
  vec![
    node("start", "start", json!({}), &["ask"]),
    node("ask", "collect_input", json!({ "variable": "name" }), &["greet"]),
    node(
      "greet",
      "send_message",
      json!({ "text": "Hello {{ name }}, welcome to {{ brand }}" }),
      &["done"],
    ),
    node("done", "end", json!({}), &[]),
  ]
}

#[tokio::test]
async fn test_suspended_run_matches_uninterrupted_run() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());
  let initial = vars(json!({ "recipient": "+15550100", "brand": "Acme" }));

  let waiting = engine.start(&published, initial.clone(), None).await.unwrap();
  assert_eq!(waiting.status, SessionStatus::WaitingForInput);
  assert_eq!(waiting.current_node_id, "ask");
  assert!(harness.sender.contents().is_empty());

  let resumed = engine
    .resume(&published, &waiting.session_id, json!("Ada"))
    .await
    .unwrap();
  let direct = engine
    .start(&published, initial, Some(json!("Ada")))
    .await
    .unwrap();

  assert_eq!(resumed.status, SessionStatus::Completed);
  assert_eq!(direct.status, SessionStatus::Completed);
  assert_eq!(resumed.variables, direct.variables);
  assert_eq!(resumed.variables["name"], "Ada");
  assert_eq!(
    harness.sender.contents(),
    vec![
      "Hello Ada, welcome to Acme".to_string(),
      "Hello Ada, welcome to Acme".to_string()
    ]
  );
}

#[tokio::test]
async fn test_session_is_persisted_while_waiting() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());

  let waiting = engine
    .start(&published, vars(json!({ "recipient": "+15550100" })), None)
    .await
    .unwrap();

  let stored = engine.get_session(&waiting.session_id).await.unwrap();
  assert_eq!(stored.status, SessionStatus::WaitingForInput);
  assert_eq!(stored.current_node_id, "ask");
  assert_eq!(stored.workflow_version, 1);
}

#[tokio::test]
async fn test_unresolved_placeholder_is_sent_verbatim() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());

  let session = engine
    .start(&published, vars(json!({ "recipient": "+15550100" })), Some(json!("Ada")))
    .await
    .unwrap();

  assert_eq!(session.status, SessionStatus::Completed);
  assert_eq!(
    harness.sender.contents(),
    vec!["Hello Ada, welcome to {{ brand }}".to_string()]
  );
  let sent = harness.sender.sent.lock()[0].clone();
  assert_eq!(sent.recipient, "+15550100");
  assert_eq!(sent.connection_id, "default");
}

fn menu_flow() -> Vec<NodeDef> {
  vec![
    node("start", "start", json!({}), &["menu"]),
    node(
      "menu",
      "multiple_choice",
      json!({
        "variable": "department",
        "options": [
          { "label": "Sales", "value": "sales", "next": "sales" },
          { "label": "Support", "value": "support", "next": "handoff" }
        ]
      }),
      &["sales", "handoff"],
    ),
    node("sales", "send_message", json!({ "text": "Our sales team will call you" }), &["done"]),
    node(
      "handoff",
      "transfer_to_human",
      json!({ "queue": "tier1", "reason": "{{ department }} request" }),
      &[],
    ),
    node("done", "end", json!({}), &[]),
  ]
}

#[tokio::test]
async fn test_multiple_choice_branches_on_selection() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(menu_flow());
  let initial = vars(json!({ "recipient": "+15550100" }));

  let by_position = engine
    .start(&published, initial.clone(), Some(json!("1")))
    .await
    .unwrap();
  assert_eq!(by_position.status, SessionStatus::Completed);
  assert_eq!(by_position.variables["department"], "sales");
  assert_eq!(
    harness.sender.contents(),
    vec!["Our sales team will call you".to_string()]
  );

  let by_label = engine
    .start(&published, initial, Some(json!("support")))
    .await
    .unwrap();
  assert_eq!(by_label.status, SessionStatus::Transferred);
  assert_eq!(by_label.current_node_id, "handoff");
  assert_eq!(by_label.variables["transfer_queue"], "tier1");
  assert_eq!(by_label.variables["transfer_reason"], "support request");
}

#[tokio::test]
async fn test_invalid_choice_keeps_waiting() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(menu_flow());

  let session = engine
    .start(&published, Map::new(), Some(json!("billing")))
    .await
    .unwrap();
  assert_eq!(session.status, SessionStatus::WaitingForInput);
  assert_eq!(session.current_node_id, "menu");

  let session = engine
    .resume(&published, &session.session_id, json!("Support"))
    .await
    .unwrap();
  assert_eq!(session.status, SessionStatus::Transferred);
}

#[tokio::test]
async fn test_transferred_session_cannot_be_resumed() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(menu_flow());

  let session = engine
    .start(&published, Map::new(), Some(json!("2")))
    .await
    .unwrap();
  assert_eq!(session.status, SessionStatus::Transferred);

  let err = engine
    .resume(&published, &session.session_id, json!("hello?"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::NotWaiting {
      status: SessionStatus::Transferred,
      ..
    }
  ));
}

fn vip_flow() -> Vec<NodeDef> {
  vec![
    node("start", "start", json!({}), &["lookup"]),
    node(
      "lookup",
      "http_request",
      json!({
        "url": "https://crm.example.com/customers/{{ customer_id }}",
        "headers": { "x-trace": "{{ session }}" },
        "save_as": "customer"
      }),
      &["check"],
    ),
    node(
      "check",
      "condition",
      json!({
        "variable": "customer.body.tier",
        "operator": "equals",
        "value": "gold",
        "true_next": "vip",
        "false_next": "regular"
      }),
      &["vip", "regular"],
    ),
    node("vip", "set_variable", json!({ "name": "priority", "value": "high" }), &["done"]),
    node("regular", "set_variable", json!({ "name": "priority", "value": "normal" }), &["done"]),
    node("done", "end", json!({}), &[]),
  ]
}

#[tokio::test]
async fn test_condition_routes_on_http_response() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(vip_flow());

  let session = engine
    .start(&published, vars(json!({ "customer_id": 42 })), None)
    .await
    .unwrap();

  assert_eq!(session.status, SessionStatus::Completed);
  assert_eq!(session.variables["condition_result"], true);
  assert_eq!(session.variables["priority"], "high");
  assert_eq!(session.variables["customer"]["status"], 200);

  let requests = harness.webhook.requests.lock();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].method, "GET");
  assert_eq!(requests[0].url, "https://crm.example.com/customers/42");
  assert_eq!(requests[0].headers["x-trace"], "{{ session }}");
}

#[tokio::test]
async fn test_node_failure_fails_session() {
  let harness = Harness::with_sender(
    RecordingSender::failing(CollaboratorError::Validation("recipient blocked".to_string())),
    5,
  );
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());

  let session = engine
    .start(&published, vars(json!({ "recipient": "+15550100" })), Some(json!("Ada")))
    .await
    .unwrap();

  assert_eq!(session.status, SessionStatus::Failed);
  let failure = session.failure.as_ref().unwrap();
  assert_eq!(failure.node_id, "greet");
  assert!(failure.error.contains("recipient blocked"));

  let stored = engine.get_session(&session.session_id).await.unwrap();
  assert_eq!(stored.status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_missing_recipient_fails_before_sending() {
  let harness = Harness::new();
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());

  let session = engine
    .start(&published, Map::new(), Some(json!("Ada")))
    .await
    .unwrap();

  assert_eq!(session.status, SessionStatus::Failed);
  assert_eq!(session.failure.unwrap().node_id, "greet");
  assert_eq!(*harness.sender.attempts.lock(), 0);
}

#[tokio::test]
async fn test_open_breaker_short_circuits_later_sessions() {
  let harness = Harness::with_sender(
    RecordingSender::failing(CollaboratorError::Transient("gateway unavailable".to_string())),
    1,
  );
  let engine = harness.engine();
  let published = harness.publish(greeting_flow());
  let initial = vars(json!({ "recipient": "+15550100" }));

  let first = engine
    .start(&published, initial.clone(), Some(json!("Ada")))
    .await
    .unwrap();
  assert_eq!(first.status, SessionStatus::Failed);
  assert_eq!(*harness.sender.attempts.lock(), 1);

  let second = engine
    .start(&published, initial, Some(json!("Grace")))
    .await
    .unwrap();
  assert_eq!(second.status, SessionStatus::Failed);
  assert!(second.failure.unwrap().error.contains("messaging"));
  assert_eq!(*harness.sender.attempts.lock(), 1);
}

#[tokio::test]
async fn test_cycle_is_stopped_by_step_limit() {
  let harness = Harness::new();
  let engine = ExecutionEngine::new(
    Arc::new(harness.store.clone()),
    EngineSettings {
      max_steps_per_run: 5,
    },
  );
  let published = harness.publish(vec![
    node("start", "start", json!({}), &["ping"]),
    node("ping", "set_variable", json!({ "name": "side", "value": "ping" }), &["pong"]),
    node("pong", "set_variable", json!({ "name": "side", "value": "pong" }), &["ping"]),
  ]);

  let session = engine.start(&published, Map::new(), None).await.unwrap();

  assert_eq!(session.status, SessionStatus::Failed);
  assert!(session.failure.unwrap().error.contains("exceeded 5"));
}

#[tokio::test]
async fn test_publish_rejects_unknown_node_type() {
  let harness = Harness::new();
  let err = harness
    .publisher
    .publish(workflow(vec![
      node("start", "start", json!({}), &["template"]),
      node("template", "whatsapp_template", json!({}), &[]),
    ]))
    .unwrap_err();

  assert!(matches!(
    err,
    PublishError::Structure(WorkflowError::UnknownNodeType { .. })
  ));
}

#[tokio::test]
async fn test_publish_collects_every_node_issue() {
  let harness = Harness::new();
  let mut greet = node("greet", "send_message", json!({ "text": "hi" }), &["branch"]);
  greet.collaborator = Some("sms".to_string());

  let err = harness
    .publisher
    .publish(workflow(vec![
      node("start", "start", json!({}), &["greet"]),
      greet,
      node(
        "branch",
        "condition",
        json!({ "variable": "x", "true_next": "done", "false_next": "elsewhere" }),
        &["done"],
      ),
      node("done", "end", json!({}), &[]),
    ]))
    .unwrap_err();

  let issues: Vec<&str> = err.issues().iter().map(|i| i.node_id.as_str()).collect();
  assert_eq!(issues, vec!["branch", "greet"]);
}

#[tokio::test]
async fn test_publish_requires_registered_executor() {
  let mut registry = NodeRegistry::new();
  registry.register(StartExecutor);
  let publisher = Publisher::new(
    Arc::new(registry),
    Arc::new(BreakerRegistry::builder().build()),
    RetryPolicy::none(),
  );

  let err = publisher
    .publish(workflow(vec![
      node("start", "start", json!({}), &["done"]),
      node("done", "end", json!({}), &[]),
    ]))
    .unwrap_err();

  assert_eq!(err.issues().len(), 1);
  assert_eq!(err.issues()[0].node_id, "done");
  assert!(err.issues()[0].message.contains("no executor"));
}

#[tokio::test]
async fn test_resume_rejects_other_version() {
  let harness = Harness::new();
  let engine = harness.engine();
  let v1 = harness.publish(greeting_flow());
  let mut def = workflow(greeting_flow());
  def.version = 2;
  let v2 = harness.publisher.publish(def).unwrap();

  let session = engine.start(&v1, Map::new(), None).await.unwrap();
  let err = engine
    .resume(&v2, &session.session_id, json!("Ada"))
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    EngineError::VersionMismatch {
      session_version: 1,
      published_version: 2,
      ..
    }
  ));
}

#[tokio::test]
async fn test_channel_notifier_receives_events() {
  let harness = Harness::new();
  let (tx, mut rx) = mpsc::unbounded_channel();
  let engine = ExecutionEngine::with_notifier(
    Arc::new(harness.store.clone()),
    EngineSettings::default(),
    ChannelNotifier::new(tx),
  );
  let published = harness.publish(greeting_flow());

  let session = engine
    .start(&published, vars(json!({ "recipient": "+15550100" })), None)
    .await
    .unwrap();
  engine
    .resume(&published, &session.session_id, json!("Ada"))
    .await
    .unwrap();
  drop(engine);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  assert!(matches!(events.first(), Some(ExecutionEvent::SessionStarted { .. })));
  assert!(events.iter().any(|e| matches!(
    e,
    ExecutionEvent::SessionWaiting { node_id, .. } if node_id == "ask"
  )));
  assert!(events.iter().any(|e| matches!(
    e,
    ExecutionEvent::SessionResumed { node_id, .. } if node_id == "ask"
  )));
  assert!(matches!(events.last(), Some(ExecutionEvent::SessionCompleted { .. })));
}

/// Holds every send until released.
#[derive(Default)]
struct GatedSender {
  entered: tokio::sync::Notify,
  release: tokio::sync::Notify,
}

#[async_trait]
impl MessageSender for GatedSender {
  async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), CollaboratorError> {
    self.entered.notify_one();
    self.release.notified().await;
    Ok(())
  }
}

#[tokio::test]
async fn test_concurrent_resume_of_same_session_is_rejected() {
  let sender = Arc::new(GatedSender::default());
  let registry = NodeRegistry::with_builtins(sender.clone(), Arc::new(FakeWebhook::default()));
  let breakers = BreakerRegistry::builder()
    .register(
      "messaging",
      BreakerConfig::new("messaging", 5, Duration::from_secs(60), Duration::from_secs(5)).unwrap(),
    )
    .unwrap()
    .build();
  let publisher = Publisher::new(Arc::new(registry), Arc::new(breakers), RetryPolicy::none());
  let published = Arc::new(publisher.publish(workflow(greeting_flow())).unwrap());
  let engine = Arc::new(ExecutionEngine::new(
    Arc::new(MemoryStore::new()),
    EngineSettings::default(),
  ));

  let session = engine
    .start(&published, vars(json!({ "recipient": "+15550100" })), None)
    .await
    .unwrap();
  let session_id = session.session_id.clone();

  let first = tokio::spawn({
    let engine = engine.clone();
    let published = published.clone();
    let session_id = session_id.clone();
    async move { engine.resume(&published, &session_id, json!("Ada")).await }
  });
  sender.entered.notified().await;

  let err = engine
    .resume(&published, &session_id, json!("Grace"))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::SessionBusy { .. }));

  sender.release.notify_one();
  let session = first.await.unwrap().unwrap();
  assert_eq!(session.status, SessionStatus::Completed);
  assert_eq!(session.variables["name"], "Ada");

  let err = engine
    .resume(&published, &session_id, json!("Grace"))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::NotWaiting { .. }));
}
