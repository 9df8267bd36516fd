use orchestra_gateway::CollaboratorError;
use orchestra_resilience::CallError;
use orchestra_saga::StepError;
use orchestra_store::{Fields, Record, StoreError};
use serde_json::{Value, json};
use tracing::debug;

use crate::Services;

pub const STATUS_SYNC_FAILED: &str = "sync_failed";

/// The `status` field of a record, if any.
pub fn status_of(record: &Record) -> Option<&str> {
  record.str_field("status")
}

pub(crate) fn fields(value: Value) -> Fields {
  match value {
    Value::Object(map) => map,
    _ => Fields::new(),
  }
}

/// A record that may already be gone.
pub(crate) async fn find(
  services: &Services,
  collection: &str,
  id: &str,
) -> Result<Option<Record>, StepError> {
  match services.store.get(collection, id).await {
    Ok(record) => Ok(Some(record)),
    Err(StoreError::NotFound { .. }) => Ok(None),
    Err(e) => Err(e.into()),
  }
}

/// Delete a local record. A record that is already gone counts as deleted.
pub(crate) async fn delete_local(
  services: &Services,
  collection: &str,
  id: &str,
) -> Result<(), StepError> {
  match services.store.delete(collection, id).await {
    Ok(()) => Ok(()),
    Err(StoreError::NotFound { .. }) => {
      debug!(collection, id, "local_record_already_deleted");
      Ok(())
    }
    Err(e) => Err(e.into()),
  }
}

/// Mark a local record `sync_failed`, keeping it. Marking twice, or marking a
/// record that no longer exists, changes nothing.
pub(crate) async fn mark_sync_failed(
  services: &Services,
  collection: &str,
  id: &str,
) -> Result<(), StepError> {
  let Some(record) = find(services, collection, id).await? else {
    return Ok(());
  };
  if status_of(&record) == Some(STATUS_SYNC_FAILED) {
    return Ok(());
  }
  services
    .store
    .update(collection, id, fields(json!({ "status": STATUS_SYNC_FAILED })))
    .await?;
  Ok(())
}

/// Delete a local record unless it was kept for audit as `sync_failed`.
pub(crate) async fn delete_unless_sync_failed(
  services: &Services,
  collection: &str,
  id: &str,
) -> Result<(), StepError> {
  match find(services, collection, id).await? {
    Some(record) if status_of(&record) == Some(STATUS_SYNC_FAILED) => Ok(()),
    Some(_) => delete_local(services, collection, id).await,
    None => Ok(()),
  }
}

pub(crate) async fn create_remote(
  services: &Services,
  kind: &str,
  payload: &Value,
) -> Result<String, StepError> {
  let platform = services.platform.as_ref();
  let remote_id = services
    .platform_call
    .call(|| platform.create_resource(kind, payload))
    .await?;
  Ok(remote_id)
}

pub(crate) async fn update_remote(
  services: &Services,
  kind: &str,
  remote_id: &str,
  payload: &Value,
) -> Result<(), StepError> {
  let platform = services.platform.as_ref();
  services
    .platform_call
    .call(|| platform.update_resource(kind, remote_id, payload))
    .await?;
  Ok(())
}

/// Delete a remote resource. A resource the platform no longer knows counts
/// as deleted.
pub(crate) async fn delete_remote(
  services: &Services,
  kind: &str,
  remote_id: &str,
) -> Result<(), StepError> {
  let platform = services.platform.as_ref();
  match services
    .platform_call
    .call(|| platform.delete_resource(kind, remote_id))
    .await
  {
    Ok(()) => Ok(()),
    Err(CallError::Inner(CollaboratorError::NotFound(_))) => {
      debug!(kind, remote_id, "remote_resource_already_deleted");
      Ok(())
    }
    Err(e) => Err(e.into()),
  }
}

/// A string field of a step output.
pub(crate) fn output_str<'a>(output: &'a Value, key: &str) -> Result<&'a str, StepError> {
  output
    .get(key)
    .and_then(Value::as_str)
    .ok_or_else(|| StepError::Internal(format!("step output is missing '{key}'")))
}
