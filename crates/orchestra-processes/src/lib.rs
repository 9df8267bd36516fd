//! Orchestra Processes
//!
//! The business processes that span the local store and the external
//! platform, each expressed as a saga:
//!
//! | saga                       | steps                                                        |
//! |----------------------------|--------------------------------------------------------------|
//! | `campaigns.create_campaign`| create local, create remote, reconcile, publish              |
//! | `leads.import_leads`       | `create_lead:<n>` for each lead, then `add_to_segment:<n>`   |
//! | `projects.create_project`  | create local, provision workspace, default tasks, reconcile  |
//! | `users.delete_user`        | mark deleting, revoke remote access, delete local            |
//!
//! Compensations are chosen per step. Records that never reached the remote
//! platform are deleted; records that did are kept and marked `sync_failed`
//! so the audit trail survives. Every compensation is idempotent.

mod campaigns;
mod leads;
mod projects;
mod support;
mod users;

use std::sync::Arc;

use orchestra_gateway::RemotePlatform;
use orchestra_resilience::{BreakerRegistry, ProtectedCall, ResilienceError, RetryPolicy};
use orchestra_saga::{SagaContext, SagaError, SagaRun, TransactionManager};
use orchestra_store::RecordStore;

pub use campaigns::{CREATE_CAMPAIGN, CampaignInput, create_campaign};
pub use leads::{IMPORT_LEADS, LeadInput, import_leads};
pub use projects::{CREATE_PROJECT, ProjectInput, create_project};
pub use support::{STATUS_SYNC_FAILED, status_of};
pub use users::{DELETE_USER, delete_user};

/// Breaker name guarding calls to the external platform.
pub const PLATFORM_BREAKER: &str = "platform";

/// Collaborators shared by every saga step.
#[derive(Clone)]
pub struct Services {
  pub store: Arc<dyn RecordStore>,
  pub platform: Arc<dyn RemotePlatform>,
  pub platform_call: ProtectedCall,
}

impl Services {
  pub fn new(
    store: Arc<dyn RecordStore>,
    platform: Arc<dyn RemotePlatform>,
    platform_call: ProtectedCall,
  ) -> Self {
    Self {
      store,
      platform,
      platform_call,
    }
  }

  /// Guard platform calls with the registry's `platform` breaker.
  pub fn from_registry(
    store: Arc<dyn RecordStore>,
    platform: Arc<dyn RemotePlatform>,
    registry: &BreakerRegistry,
    retry: RetryPolicy,
  ) -> Result<Self, ResilienceError> {
    let breaker = registry.get(PLATFORM_BREAKER)?;
    Ok(Self::new(store, platform, ProtectedCall::new(breaker, retry)))
  }
}

/// Business actions, each run as a saga through the transaction manager.
#[derive(Clone)]
pub struct Processes {
  manager: TransactionManager,
  services: Services,
}

impl Processes {
  pub fn new(manager: TransactionManager, services: Services) -> Self {
    Self { manager, services }
  }

  pub fn services(&self) -> &Services {
    &self.services
  }

  pub fn manager(&self) -> &TransactionManager {
    &self.manager
  }

  pub async fn create_campaign(&self, input: CampaignInput) -> Result<SagaRun, SagaError> {
    let definition = create_campaign(&self.services);
    self
      .manager
      .run_saga(&definition, input.into_context())
      .await
  }

  pub async fn import_leads(
    &self,
    segment_id: &str,
    leads: Vec<LeadInput>,
  ) -> Result<SagaRun, SagaError> {
    let definition = import_leads(&self.services, leads);
    let mut context = SagaContext::new();
    context.insert("segment_id", segment_id);
    self.manager.run_saga(&definition, context).await
  }

  pub async fn create_project(&self, input: ProjectInput) -> Result<SagaRun, SagaError> {
    let definition = create_project(&self.services, &input.tasks);
    self
      .manager
      .run_saga(&definition, input.into_context())
      .await
  }

  pub async fn delete_user(&self, user_id: &str) -> Result<SagaRun, SagaError> {
    let definition = delete_user(&self.services);
    let mut context = SagaContext::new();
    context.insert("user_id", user_id);
    self.manager.run_saga(&definition, context).await
  }
}
