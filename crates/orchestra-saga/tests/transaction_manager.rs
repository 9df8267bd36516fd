//! Local atomic operations and saga runs through the transaction manager.

use std::sync::Arc;

use futures::FutureExt;
use orchestra_saga::{
  FnStep, SagaContext, SagaDefinition, SagaError, SagaStatus, StepError, TransactionManager,
};
use orchestra_store::{Fields, MemoryStore, RecordStore, StoreError};
use serde_json::{Value, json};

fn fields(value: Value) -> Fields {
  value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_atomic_commits_on_success() {
  let store = MemoryStore::new();
  let manager = TransactionManager::new(Arc::new(store.clone()));

  let id = manager
    .atomic(|tx| {
      async move {
        let project = tx
          .create("projects", fields(json!({ "name": "Apollo" })))
          .await?;
        tx.create("tasks", fields(json!({ "project_id": project.id })))
          .await?;
        Ok::<_, StoreError>(project.id)
      }
      .boxed()
    })
    .await
    .unwrap();

  assert!(store.get("projects", &id).await.is_ok());
  assert_eq!(store.list("tasks").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_atomic_rolls_back_on_error() {
  let store = MemoryStore::new();
  let manager = TransactionManager::new(Arc::new(store.clone()));

  let err = manager
    .atomic(|tx| {
      async move {
        tx.create("projects", fields(json!({ "name": "Apollo" })))
          .await?;
        tx.update("projects", "missing", Fields::new()).await?;
        Ok::<_, StoreError>(())
      }
      .boxed()
    })
    .await
    .unwrap_err();

  assert!(err.is_not_found());
  assert!(store.list("projects").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_atomic_rolls_back_when_operation_panics() {
  let store = MemoryStore::new();
  let manager = TransactionManager::new(Arc::new(store.clone()));

  let handle = tokio::spawn(async move {
    manager
      .atomic(|tx| {
        async move {
          tx.create("projects", Fields::new()).await?;
          if tx.list("projects").await?.len() == 1 {
            panic!("operation crashed mid-transaction");
          }
          Ok::<_, StoreError>(())
        }
        .boxed()
      })
      .await
  });

  assert!(handle.await.unwrap_err().is_panic());
  assert!(store.list("projects").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_saga_returns_run_or_failure() {
  let manager = TransactionManager::new(Arc::new(MemoryStore::new()));

  let ok = SagaDefinition::new("projects.create_project")
    .step(FnStep::new("only", |_| async { Ok(json!({ "done": true })) }));
  let run = manager.run_saga(&ok, SagaContext::new()).await.unwrap();
  assert_eq!(run.status, SagaStatus::Completed);
  assert_eq!(run.saga_name, "projects.create_project");

  let failing = SagaDefinition::new("projects.create_project").step(FnStep::new(
    "only",
    |_| async { Err(StepError::Validation("name taken".to_string())) },
  ));
  let err = manager
    .run_saga(&failing, SagaContext::new())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    SagaError::Failed(ref failure) if failure.status == SagaStatus::Compensated
  ));
  assert!(err.to_string().contains("name taken"));
}
