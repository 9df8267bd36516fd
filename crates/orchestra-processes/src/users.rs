use async_trait::async_trait;
use orchestra_saga::{SagaContext, SagaDefinition, SagaStep, StepError};
use serde_json::{Value, json};
use tracing::info;

use crate::Services;
use crate::support::{create_remote, delete_local, delete_remote, fields, find};

pub const DELETE_USER: &str = "users.delete_user";

const COLLECTION: &str = "users";
const REMOTE_KIND: &str = "user_access";

/// Delete a user and revoke their platform access.
///
/// The user record is deleted only as the last step. Until then every
/// effect can be undone: the status is restored and revoked access is
/// provisioned again.
pub fn delete_user(services: &Services) -> SagaDefinition {
  SagaDefinition::new(DELETE_USER)
    .step(MarkDeleting(services.clone()))
    .step(RevokeAccess(services.clone()))
    .step(DeleteLocal(services.clone()))
}

struct MarkDeleting(Services);

#[async_trait]
impl SagaStep for MarkDeleting {
  fn name(&self) -> &str {
    "mark_deleting"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let user_id = ctx.require_str("user_id")?;
    let user = self.0.store.get(COLLECTION, user_id).await?;
    if user.str_field("status") == Some("deleting") {
      return Err(StepError::Validation(format!(
        "user '{user_id}' is already being deleted"
      )));
    }
    let previous = user.field("status").cloned().unwrap_or(Value::Null);
    self
      .0
      .store
      .update(COLLECTION, user_id, fields(json!({ "status": "deleting" })))
      .await?;
    Ok(json!({
      "previous_status": previous,
      "remote_access_id": user.field("remote_access_id"),
      "email": user.field("email"),
    }))
  }

  async fn compensate(&self, ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let user_id = ctx.require_str("user_id")?;
    let previous = output.get("previous_status").cloned().unwrap_or(Value::Null);
    let Some(user) = find(&self.0, COLLECTION, user_id).await? else {
      return Ok(());
    };
    if user.field("status") == Some(&previous) {
      return Ok(());
    }
    self
      .0
      .store
      .update(COLLECTION, user_id, fields(json!({ "status": previous })))
      .await?;
    Ok(())
  }
}

struct RevokeAccess(Services);

#[async_trait]
impl SagaStep for RevokeAccess {
  fn name(&self) -> &str {
    "revoke_remote_access"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let Some(access_id) = ctx.get_str("remote_access_id") else {
      return Ok(json!({ "revoked_access_id": null }));
    };
    delete_remote(&self.0, REMOTE_KIND, access_id).await?;
    Ok(json!({ "revoked_access_id": access_id }))
  }

  /// Provision access again, once. A user whose access id already differs
  /// from the revoked one was re-provisioned earlier.
  async fn compensate(&self, ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let Some(revoked) = output.get("revoked_access_id").and_then(Value::as_str) else {
      return Ok(());
    };
    let user_id = ctx.require_str("user_id")?;
    let Some(user) = find(&self.0, COLLECTION, user_id).await? else {
      return Ok(());
    };
    if user.str_field("remote_access_id") != Some(revoked) {
      return Ok(());
    }

    let payload = json!({ "external_ref": user_id, "email": ctx.get("email") });
    let access_id = create_remote(&self.0, REMOTE_KIND, &payload).await?;
    self
      .0
      .store
      .update(
        COLLECTION,
        user_id,
        fields(json!({ "remote_access_id": access_id })),
      )
      .await?;
    info!(user_id, remote_access_id = %access_id, "user_access_reprovisioned");
    Ok(())
  }
}

/// Pivot step: once the record is gone nothing is compensated.
struct DeleteLocal(Services);

#[async_trait]
impl SagaStep for DeleteLocal {
  fn name(&self) -> &str {
    "delete_local"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    delete_local(&self.0, COLLECTION, ctx.require_str("user_id")?).await?;
    Ok(json!({ "deleted": true }))
  }

  fn has_compensation(&self) -> bool {
    false
  }
}
