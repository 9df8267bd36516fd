use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use orchestra_store::{StoreError, Transaction, TransactionalStore};
use tracing::{error, info, instrument, warn};

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::SagaError;
use crate::orchestrator::SagaOrchestrator;
use crate::run::SagaRun;

/// Entry point for business actions.
///
/// Single-step work runs through [`atomic`](Self::atomic); multi-step work
/// that crosses collaborators runs as a saga through
/// [`run_saga`](Self::run_saga).
#[derive(Clone)]
pub struct TransactionManager {
  store: Arc<dyn TransactionalStore>,
  orchestrator: SagaOrchestrator,
}

impl TransactionManager {
  pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
    Self {
      store,
      orchestrator: SagaOrchestrator::default(),
    }
  }

  pub fn with_orchestrator(mut self, orchestrator: SagaOrchestrator) -> Self {
    self.orchestrator = orchestrator;
    self
  }

  pub fn orchestrator(&self) -> &SagaOrchestrator {
    &self.orchestrator
  }

  /// Run `operation` inside one store transaction.
  ///
  /// Commits on `Ok` and rolls back on `Err`. If the operation panics or its
  /// future is dropped, the transaction is dropped unfinished and the store
  /// discards its writes.
  pub async fn atomic<T, E, F>(&self, operation: F) -> Result<T, E>
  where
    F: for<'a> FnOnce(&'a dyn Transaction) -> BoxFuture<'a, Result<T, E>>,
    E: From<StoreError> + std::fmt::Display,
  {
    let tx = self.store.begin().await?;
    let result = operation(tx.as_ref()).await;

    match result {
      Ok(value) => {
        tx.commit().await?;
        Ok(value)
      }
      Err(e) => {
        warn!(error = %e, "transaction_rolled_back");
        if let Err(rollback) = tx.rollback().await {
          error!(error = %rollback, "transaction_rollback_failed");
        }
        Err(e)
      }
    }
  }

  /// Run a saga and log its fully-qualified name, terminal status and
  /// duration.
  #[instrument(name = "saga_run", skip_all, fields(saga_name = %definition.name()))]
  pub async fn run_saga(
    &self,
    definition: &SagaDefinition,
    context: SagaContext,
  ) -> Result<SagaRun, SagaError> {
    let started = Instant::now();
    let result = self.orchestrator.run(definition, context).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match &result {
      Ok(run) => info!(
        saga_name = definition.name(),
        run_id = %run.id,
        status = ?run.status,
        duration_ms,
        "saga_finished"
      ),
      Err(SagaError::Failed(failure)) => error!(
        saga_name = definition.name(),
        run_id = %failure.run_id,
        status = ?failure.status,
        failed_step = %failure.step,
        uncompensated = ?failure.uncompensated,
        duration_ms,
        error = %failure.source,
        "saga_finished"
      ),
      Err(e) => error!(
        saga_name = definition.name(),
        duration_ms,
        error = %e,
        "saga_rejected"
      ),
    }

    result
  }
}
