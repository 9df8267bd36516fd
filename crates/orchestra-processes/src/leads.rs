use async_trait::async_trait;
use orchestra_saga::{SagaContext, SagaDefinition, SagaStep, StepError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Services;
use crate::support::{create_remote, delete_local, fields, find, mark_sync_failed, output_str};

pub const IMPORT_LEADS: &str = "leads.import_leads";

const COLLECTION: &str = "leads";
const REMOTE_KIND: &str = "segment_members";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadInput {
  pub email: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
}

/// Import a batch of leads and add each one to the remote segment named by
/// the context's `segment_id`.
///
/// All local leads are created first, then each is added to the segment. On a
/// failure, leads that already reached the segment are kept and marked
/// `sync_failed`; leads that never did are deleted. A batch is never wiped
/// wholesale.
pub fn import_leads(services: &Services, leads: Vec<LeadInput>) -> SagaDefinition {
  let mut definition = SagaDefinition::new(IMPORT_LEADS);
  for (index, lead) in leads.iter().enumerate() {
    definition = definition.step(CreateLead {
      services: services.clone(),
      name: format!("create_lead:{index}"),
      index,
      lead: lead.clone(),
    });
  }
  for index in 0..leads.len() {
    definition = definition.step(AddToSegment {
      services: services.clone(),
      name: format!("add_to_segment:{index}"),
      index,
    });
  }
  definition
}

fn lead_key(index: usize) -> String {
  format!("lead_{index}_id")
}

struct CreateLead {
  services: Services,
  name: String,
  index: usize,
  lead: LeadInput,
}

#[async_trait]
impl SagaStep for CreateLead {
  fn name(&self) -> &str {
    &self.name
  }

  async fn execute(&self, _ctx: &SagaContext) -> Result<Value, StepError> {
    let email = self.lead.email.trim();
    if !email.contains('@') {
      return Err(StepError::Validation(format!(
        "lead {} has an invalid email '{email}'",
        self.index
      )));
    }
    let record = self
      .services
      .store
      .create(
        COLLECTION,
        fields(json!({
          "email": email,
          "name": self.lead.name,
          "phone": self.lead.phone,
          "status": "imported",
        })),
      )
      .await?;

    let mut output = serde_json::Map::new();
    output.insert(lead_key(self.index), Value::String(record.id));
    Ok(Value::Object(output))
  }

  /// Delete the lead unless it reached the remote segment.
  async fn compensate(&self, _ctx: &SagaContext, output: &Value) -> Result<(), StepError> {
    let id = output_str(output, &lead_key(self.index))?;
    match find(&self.services, COLLECTION, id).await? {
      Some(lead) if lead.str_field("remote_member_id").is_some() => Ok(()),
      Some(_) => delete_local(&self.services, COLLECTION, id).await,
      None => Ok(()),
    }
  }
}

struct AddToSegment {
  services: Services,
  name: String,
  index: usize,
}

#[async_trait]
impl SagaStep for AddToSegment {
  fn name(&self) -> &str {
    &self.name
  }

  async fn execute(&self, ctx: &SagaContext) -> Result<Value, StepError> {
    let segment_id = ctx.require_str("segment_id")?;
    let lead_id = ctx.require_str(&lead_key(self.index))?;
    let lead = self.services.store.get(COLLECTION, lead_id).await?;

    let payload = json!({
      "segment_id": segment_id,
      "email": lead.field("email"),
      "name": lead.field("name"),
      "external_ref": lead_id,
    });
    let member_id = create_remote(&self.services, REMOTE_KIND, &payload).await?;
    self
      .services
      .store
      .update(
        COLLECTION,
        lead_id,
        fields(json!({ "remote_member_id": member_id, "status": "synced" })),
      )
      .await?;

    let mut output = serde_json::Map::new();
    output.insert(format!("lead_{}_member_id", self.index), Value::String(member_id));
    Ok(Value::Object(output))
  }

  /// Keep the lead and flag it for a later re-sync.
  async fn compensate(&self, ctx: &SagaContext, _output: &Value) -> Result<(), StepError> {
    let lead_id = ctx.require_str(&lead_key(self.index))?;
    mark_sync_failed(&self.services, COLLECTION, lead_id).await
  }
}
