//! In-memory store, used by tests and the CLI's dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use orchestra_workflow::WorkflowSession;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{Fields, Record};
use crate::{RecordStore, SessionStore, StoreError, Transaction, TransactionalStore};

type Key = (String, String);

fn key(collection: &str, id: &str) -> Key {
  (collection.to_string(), id.to_string())
}

/// Records keyed by (collection, id), remembering insertion order.
#[derive(Debug, Default, Clone)]
struct Records {
  next_seq: u64,
  entries: HashMap<Key, (u64, Record)>,
}

impl Records {
  fn put(&mut self, record: Record) {
    let key = key(&record.collection, &record.id);
    let seq = match self.entries.get(&key) {
      Some((seq, _)) => *seq,
      None => {
        self.next_seq += 1;
        self.next_seq
      }
    };
    self.entries.insert(key, (seq, record));
  }

  fn create(&mut self, collection: &str, fields: Fields) -> Record {
    let record = Record::new(collection, fields);
    self.put(record.clone());
    record
  }

  fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
    self
      .entries
      .get(&key(collection, id))
      .map(|(_, record)| record.clone())
      .ok_or_else(|| StoreError::not_found(collection, id))
  }

  fn update(&mut self, collection: &str, id: &str, fields: Fields) -> Result<Record, StoreError> {
    let (_, record) = self
      .entries
      .get_mut(&key(collection, id))
      .ok_or_else(|| StoreError::not_found(collection, id))?;
    record.merge(fields);
    Ok(record.clone())
  }

  fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError> {
    self
      .entries
      .remove(&key(collection, id))
      .map(|_| ())
      .ok_or_else(|| StoreError::not_found(collection, id))
  }

  fn list(&self, collection: &str) -> Vec<Record> {
    let mut matching: Vec<&(u64, Record)> = self
      .entries
      .iter()
      .filter(|((c, _), _)| c == collection)
      .map(|(_, entry)| entry)
      .collect();
    matching.sort_by_key(|(seq, _)| *seq);
    matching.into_iter().map(|(_, r)| r.clone()).collect()
  }
}

#[derive(Debug, Default)]
struct State {
  records: Records,
  sessions: HashMap<String, WorkflowSession>,
}

/// In-memory implementation of every store trait. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  state: Arc<Mutex<State>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RecordStore for MemoryStore {
  async fn create(&self, collection: &str, fields: Fields) -> Result<Record, StoreError> {
    Ok(self.state.lock().records.create(collection, fields))
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
    self.state.lock().records.get(collection, id)
  }

  async fn update(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<Record, StoreError> {
    self.state.lock().records.update(collection, id, fields)
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    self.state.lock().records.delete(collection, id)
  }

  async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
    Ok(self.state.lock().records.list(collection))
  }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
  async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
    let working = self.state.lock().records.clone();
    Ok(Box::new(MemoryTransaction {
      store: self.clone(),
      inner: Mutex::new(TxState {
        working,
        journal: Vec::new(),
      }),
    }))
  }
}

#[async_trait]
impl SessionStore for MemoryStore {
  async fn save_session(&self, session: &WorkflowSession) -> Result<(), StoreError> {
    self
      .state
      .lock()
      .sessions
      .insert(session.session_id.clone(), session.clone());
    Ok(())
  }

  async fn get_session(&self, session_id: &str) -> Result<WorkflowSession, StoreError> {
    self
      .state
      .lock()
      .sessions
      .get(session_id)
      .cloned()
      .ok_or_else(|| StoreError::not_found("workflow_sessions", session_id))
  }

  async fn list_sessions(&self, workflow_id: &str) -> Result<Vec<WorkflowSession>, StoreError> {
    let mut sessions: Vec<WorkflowSession> = self
      .state
      .lock()
      .sessions
      .values()
      .filter(|s| s.workflow_id == workflow_id)
      .cloned()
      .collect();
    sessions.sort_by_key(|s| s.created_at);
    Ok(sessions)
  }
}

#[derive(Debug)]
enum Op {
  Put(Record),
  Remove { collection: String, id: String },
}

struct TxState {
  working: Records,
  journal: Vec<Op>,
}

/// Reads see a snapshot taken at `begin` plus this transaction's own writes.
/// The journal is replayed onto the shared state on commit and discarded
/// otherwise.
struct MemoryTransaction {
  store: MemoryStore,
  inner: Mutex<TxState>,
}

#[async_trait]
impl RecordStore for MemoryTransaction {
  async fn create(&self, collection: &str, fields: Fields) -> Result<Record, StoreError> {
    let mut tx = self.inner.lock();
    let record = tx.working.create(collection, fields);
    tx.journal.push(Op::Put(record.clone()));
    Ok(record)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
    self.inner.lock().working.get(collection, id)
  }

  async fn update(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<Record, StoreError> {
    let mut tx = self.inner.lock();
    let record = tx.working.update(collection, id, fields)?;
    tx.journal.push(Op::Put(record.clone()));
    Ok(record)
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    let mut tx = self.inner.lock();
    tx.working.delete(collection, id)?;
    tx.journal.push(Op::Remove {
      collection: collection.to_string(),
      id: id.to_string(),
    });
    Ok(())
  }

  async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
    Ok(self.inner.lock().working.list(collection))
  }
}

#[async_trait]
impl Transaction for MemoryTransaction {
  async fn commit(self: Box<Self>) -> Result<(), StoreError> {
    let journal = std::mem::take(&mut self.inner.lock().journal);
    let mut state = self.store.state.lock();
    debug!(operations = journal.len(), "memory_transaction_committed");
    for op in journal {
      match op {
        Op::Put(record) => state.records.put(record),
        Op::Remove { collection, id } => {
          state.records.entries.remove(&key(&collection, &id));
        }
      }
    }
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
    debug!(
      operations = self.inner.lock().journal.len(),
      "memory_transaction_rolled_back"
    );
    Ok(())
  }
}
