use async_trait::async_trait;
use orchestra_saga::{SagaContext, SagaDefinition, SagaStep, StepError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Services;
use crate::support::{
  create_remote, delete_local, delete_remote, delete_unless_sync_failed, fields,
  mark_sync_failed, output_str,
};

pub const CREATE_PROJECT: &str = "projects.create_project";

const COLLECTION: &str = "projects";
const TASKS: &str = "tasks";
const REMOTE_KIND: &str = "workspaces";

const DEFAULT_TASKS: [&str; 3] = ["Kickoff", "Planning", "Review"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInput {
  pub name: String,
  #[serde(default)]
  pub owner_id: Option<String>,
  /// Task titles created with the project. Empty means the default set.
  #[serde(default)]
  pub tasks: Vec<String>,
}

impl ProjectInput {
  pub fn into_context(self) -> SagaContext {
    SagaContext::from_value(json!({
      "name": self.name,
      "owner_id": self.owner_id,
    }))
  }
}

/// Create a project with a remote workspace and its starting tasks.
pub fn create_project(services: &Services, tasks: &[String]) -> SagaDefinition {
  let tasks = if tasks.is_empty() {
    DEFAULT_TASKS.iter().map(|t| t.to_string()).collect()
  } else {
    tasks.to_vec()
  };

  SagaDefinition::new(CREATE_PROJECT)
    .step(CreateLocal(services.clone()))
    .step(ProvisionWorkspace(services.clone()))
    .step(CreateTasks {
      services: services.clone(),
      titles: tasks,
    })
    .step(Reconcile(services.clone()))
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
      return Err(StepError::Validation("project name is empty".to_string()));
    }
    let record = self
      .0
      .store
      .create(
        COLLECTION,
        fields(json!({
          "name": name,
          "owner_id": ctx.get("owner_id"),
          "status": "provisioning",
        })),
      )
      .await?;
    Ok(json!({ "project_id": record.id }))
  }

  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    delete_unless_sync_failed(&self.0, COLLECTION, output_str(output, "project_id")?).await
  }
}

struct ProvisionWorkspace(Services);

#[async_trait]
impl SagaStep for ProvisionWorkspace {
  fn name(&self) -> &str {
    "provision_workspace"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let payload = json!({
      "name": ctx.require_str("name")?,
      "external_ref": ctx.require_str("project_id")?,
    });
    let workspace_id = create_remote(&self.0, REMOTE_KIND, &payload).await?;
    Ok(json!({ "workspace_id": workspace_id }))
  }

  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    delete_remote(&self.0, REMOTE_KIND, output_str(output, "workspace_id")?).await
  }
}

struct CreateTasks {
  services: Services,
  titles: Vec<String>,
}

#[async_trait]
impl SagaStep for CreateTasks {
  fn name(&self) -> &str {
    "create_default_tasks"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let project_id = ctx.require_str("project_id")?;
    let mut ids = Vec::with_capacity(self.titles.len());
    for (position, title) in self.titles.iter().enumerate() {
      let created = self
        .services
        .store
        .create(
          TASKS,
          fields(json!({
            "project_id": project_id,
            "title": title,
            "position": position,
            "status": "open",
          })),
        )
        .await;
      match created {
        Ok(task) => ids.push(task.id),
        Err(e) => {
          // The step is not logged as completed, so undo its partial work here.
          for id in &ids {
            delete_local(&self.services, TASKS, id).await?;
          }
          return Err(e.into());
        }
      }
    }
    Ok(json!({ "task_ids": ids }))
  }

  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let ids = output
      .get("task_ids")
      .and_then(Value::as_array)
      .map(Vec::as_slice)
      .unwrap_or_default();
    for id in ids.iter().filter_map(Value::as_str) {
      delete_local(&self.services, TASKS, id).await?;
    }
    Ok(())
  }
}

struct Reconcile(Services);

#[async_trait]
impl SagaStep for Reconcile {
  fn name(&self) -> &str {
    "reconcile"
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    self
      .0
      .store
      .update(
        COLLECTION,
        ctx.require_str("project_id")?,
        fields(json!({
          "workspace_id": ctx.require_str("workspace_id")?,
          "status": "active",
        })),
      )
      .await?;
    Ok(Value::Null)
  }

  async fn compensate(&self, ctx: &SagaContext, _output: &Value) -> Result<(), StepError> {
    mark_sync_failed(&self.0, COLLECTION, ctx.require_str("project_id")?).await
  }
}
