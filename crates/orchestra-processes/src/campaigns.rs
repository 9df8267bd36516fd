use async_trait::async_trait;
use orchestra_saga::{SagaContext, SagaDefinition, SagaStep, StepError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Services;
use crate::support::{
  create_remote, delete_remote, delete_unless_sync_failed, fields, mark_sync_failed,
  output_str, update_remote,
};

pub const CREATE_CAMPAIGN: &str = "campaigns.create_campaign";

const COLLECTION: &str = "campaigns";
const REMOTE_KIND: &str = "campaigns";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignInput {
  pub name: String,
  #[serde(default)]
  pub objective: Option<String>,
  #[serde(default)]
  pub daily_budget: Option<f64>,
}

impl CampaignInput {
  pub fn into_context(self) -> SagaContext {
    SagaContext::from_value(json!({
      "name": self.name,
      "objective": self.objective,
      "daily_budget": self.daily_budget,
    }))
  }
}

/// Create a campaign locally, mirror it on the platform and publish it.
///
/// A failure before the remote campaign exists deletes the local draft. Once
/// the local campaign was reconciled with its remote id it is kept and marked
/// `sync_failed`, while the remote campaign is deleted.
pub fn create_campaign(services: &Services) -> SagaDefinition {
  SagaDefinition::new(CREATE_CAMPAIGN)
    .step(CreateLocal(services.clone()))
    .step(CreateRemote(services.clone()))
    .step(Reconcile(services.clone()))
    .step(Publish(services.clone()))
}

struct CreateLocal(Services);

#[async_trait]
impl SagaStep for CreateLocal {
  fn name(&self) -> &str {
    "create_local"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let name = ctx.require_str("name")?;
    if name.trim().is_empty() {
      return Err(StepError::Validation("campaign name is empty".to_string()));
    }
    let record = self
      .0
      .store
      .create(
        COLLECTION,
        fields(json!({
          "name": name,
          "objective": ctx.get("objective"),
          "daily_budget": ctx.get("daily_budget"),
          "status": "draft",
        })),
      )
      .await?;
    Ok(json!({ "campaign_id": record.id }))
  }

  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let id = output_str(output, "campaign_id")?;
    delete_unless_sync_failed(&self.0, COLLECTION, id).await
  }
}

struct CreateRemote(Services);

#[async_trait]
impl SagaStep for CreateRemote {
  fn name(&self) -> &str {
    "create_remote"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let payload = json!({
      "name": ctx.require_str("name")?,
      "objective": ctx.get("objective"),
      "daily_budget": ctx.get("daily_budget"),
      "external_ref": ctx.require_str("campaign_id")?,
    });
    let remote_id = create_remote(&self.0, REMOTE_KIND, &payload).await?;
    Ok(json!({ "remote_campaign_id": remote_id }))
  }

  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let remote_id = output_str(output, "remote_campaign_id")?;
    delete_remote(&self.0, REMOTE_KIND, remote_id).await
  }
}

struct Reconcile(Services);

#[async_trait]
impl SagaStep for Reconcile {
  fn name(&self) -> &str {
    "reconcile"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let id = ctx.require_str("campaign_id")?;
    let remote_id = ctx.require_str("remote_campaign_id")?;
    self
      .0
      .store
      .update(
        COLLECTION,
        id,
        fields(json!({ "remote_id": remote_id, "status": "active" })),
      )
      .await?;
    Ok(Value::Null)
  }

  async fn compensate(&self, ctx: &SagaContext, _output: &Value) -> Result<(), StepError> {
    mark_sync_failed(&self.0, COLLECTION, ctx.require_str("campaign_id")?).await
  }
}

struct Publish(Services);

#[async_trait]
impl SagaStep for Publish {
  fn name(&self) -> &str {
    "publish"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let remote_id = ctx.require_str("remote_campaign_id")?;
    update_remote(&self.0, REMOTE_KIND, remote_id, &json!({ "status": "published" })).await?;
    self
      .0
      .store
      .update(
        COLLECTION,
        ctx.require_str("campaign_id")?,
        fields(json!({ "status": "published" })),
      )
      .await?;
    Ok(json!({ "published": true }))
  }

  fn has_compensation(&self) -> bool {
    false
  }
}
