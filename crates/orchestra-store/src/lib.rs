//! Orchestra Store
//!
//! This crate provides the persistence collaborator used by sagas and the
//! workflow engine. Data is held in memory or persisted to SQLite.
//!
//! - [`RecordStore`] creates, reads, merges and deletes free-form records
//!   grouped by collection.
//! - [`TransactionalStore`] opens a [`Transaction`], a record store whose
//!   writes become visible only on commit. Dropping an open transaction rolls
//!   it back.
//! - [`SessionStore`] persists workflow sessions between node steps.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{Fields, Record};

use async_trait::async_trait;
use orchestra_workflow::WorkflowSession;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("{collection} '{id}' not found")]
  NotFound { collection: String, id: String },

  /// The transaction was already committed or rolled back.
  #[error("transaction is closed")]
  TransactionClosed,

  /// A stored document could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A migration failed.
  #[error("migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
  pub fn not_found(collection: &str, id: &str) -> Self {
    Self::NotFound {
      collection: collection.to_string(),
      id: id.to_string(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound { .. })
  }
}

/// Record storage grouped by collection.
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Create a record with a generated id.
  async fn create(&self, collection: &str, fields: Fields) -> Result<Record, StoreError>;

  /// Get a record by id.
  async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError>;

  /// Merge `fields` into an existing record.
  async fn update(&self, collection: &str, id: &str, fields: Fields)
  -> Result<Record, StoreError>;

  /// Delete a record. Deleting a missing record is `NotFound`.
  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

  /// List records of a collection, oldest first.
  async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;
}

/// An open unit of work. Writes are visible to other readers only after
/// [`commit`](Transaction::commit).
#[async_trait]
pub trait Transaction: RecordStore {
  async fn commit(self: Box<Self>) -> Result<(), StoreError>;

  async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TransactionalStore: RecordStore {
  async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// Persistence for workflow sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
  /// Insert or replace a session.
  async fn save_session(&self, session: &WorkflowSession) -> Result<(), StoreError>;

  async fn get_session(&self, session_id: &str) -> Result<WorkflowSession, StoreError>;

  async fn list_sessions(&self, workflow_id: &str) -> Result<Vec<WorkflowSession>, StoreError>;
}
