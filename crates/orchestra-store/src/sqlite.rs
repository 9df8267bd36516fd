use async_trait::async_trait;
use orchestra_workflow::WorkflowSession;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;

use crate::types::{Fields, Record, RecordRow};
use crate::{RecordStore, SessionStore, StoreError, Transaction, TransactionalStore};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let options = url
      .parse::<SqliteConnectOptions>()?
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

async fn insert_record(conn: &mut SqliteConnection, record: &Record) -> Result<(), StoreError> {
  sqlx::query(
    r#"
    INSERT INTO records (collection, id, fields, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?)
    "#,
  )
  .bind(&record.collection)
  .bind(&record.id)
  .bind(Json(&record.fields))
  .bind(record.created_at)
  .bind(record.updated_at)
  .execute(conn)
  .await?;

  Ok(())
}

async fn fetch_record(
  conn: &mut SqliteConnection,
  collection: &str,
  id: &str,
) -> Result<Record, StoreError> {
  let row: Option<RecordRow> = sqlx::query_as(
    r#"
    SELECT collection, id, fields, created_at, updated_at
    FROM records
    WHERE collection = ? AND id = ?
    "#,
  )
  .bind(collection)
  .bind(id)
  .fetch_optional(conn)
  .await?;

  row
    .map(Record::from)
    .ok_or_else(|| StoreError::not_found(collection, id))
}

async fn merge_record(
  conn: &mut SqliteConnection,
  collection: &str,
  id: &str,
  fields: Fields,
) -> Result<Record, StoreError> {
  let mut record = fetch_record(&mut *conn, collection, id).await?;
  record.merge(fields);

  sqlx::query(
    r#"
    UPDATE records
    SET fields = ?, updated_at = ?
    WHERE collection = ? AND id = ?
    "#,
  )
  .bind(Json(&record.fields))
  .bind(record.updated_at)
  .bind(collection)
  .bind(id)
  .execute(&mut *conn)
  .await?;

  Ok(record)
}

async fn delete_record(
  conn: &mut SqliteConnection,
  collection: &str,
  id: &str,
) -> Result<(), StoreError> {
  let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
    .bind(collection)
    .bind(id)
    .execute(conn)
    .await?;

  if result.rows_affected() == 0 {
    return Err(StoreError::not_found(collection, id));
  }
  Ok(())
}

async fn list_records(
  conn: &mut SqliteConnection,
  collection: &str,
) -> Result<Vec<Record>, StoreError> {
  let rows: Vec<RecordRow> = sqlx::query_as(
    r#"
    SELECT collection, id, fields, created_at, updated_at
    FROM records
    WHERE collection = ?
    ORDER BY created_at ASC, rowid ASC
    "#,
  )
  .bind(collection)
  .fetch_all(conn)
  .await?;

  Ok(rows.into_iter().map(Record::from).collect())
}

#[async_trait]
impl RecordStore for SqliteStore {
  async fn create(&self, collection: &str, fields: Fields) -> Result<Record, StoreError> {
    let record = Record::new(collection, fields);
    let mut conn = self.pool.acquire().await?;
    insert_record(&mut conn, &record).await?;
    Ok(record)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
    let mut conn = self.pool.acquire().await?;
    fetch_record(&mut conn, collection, id).await
  }

  async fn update(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<Record, StoreError> {
    let mut tx = self.pool.begin().await?;
    let record = merge_record(&mut tx, collection, id, fields).await?;
    tx.commit().await?;
    Ok(record)
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    let mut conn = self.pool.acquire().await?;
    delete_record(&mut conn, collection, id).await
  }

  async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    list_records(&mut conn, collection).await
  }
}

#[async_trait]
impl TransactionalStore for SqliteStore {
  async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
    let tx = self.pool.begin().await?;
    Ok(Box::new(SqliteTransaction {
      tx: Mutex::new(Some(tx)),
    }))
  }
}

#[async_trait]
impl SessionStore for SqliteStore {
  async fn save_session(&self, session: &WorkflowSession) -> Result<(), StoreError> {
    let status = serde_json::to_value(session.status)?;
    sqlx::query(
      r#"
      INSERT INTO workflow_sessions (session_id, workflow_id, status, body, updated_at)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (session_id) DO UPDATE SET
        status = excluded.status,
        body = excluded.body,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(&session.session_id)
    .bind(&session.workflow_id)
    .bind(status.as_str().unwrap_or_default())
    .bind(Json(session))
    .bind(session.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_session(&self, session_id: &str) -> Result<WorkflowSession, StoreError> {
    let body: Option<(Json<WorkflowSession>,)> =
      sqlx::query_as("SELECT body FROM workflow_sessions WHERE session_id = ?")
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

    body
      .map(|(Json(session),)| session)
      .ok_or_else(|| StoreError::not_found("workflow_sessions", session_id))
  }

  async fn list_sessions(&self, workflow_id: &str) -> Result<Vec<WorkflowSession>, StoreError> {
    let rows: Vec<(Json<WorkflowSession>,)> = sqlx::query_as(
      r#"
      SELECT body FROM workflow_sessions
      WHERE workflow_id = ?
      ORDER BY rowid ASC
      "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(|(Json(session),)| session).collect())
  }
}

/// A SQLite transaction. sqlx rolls the transaction back if it is dropped
/// without being committed.
struct SqliteTransaction {
  tx: Mutex<Option<sqlx::Transaction<'static, Sqlite>>>,
}

#[async_trait]
impl RecordStore for SqliteTransaction {
  async fn create(&self, collection: &str, fields: Fields) -> Result<Record, StoreError> {
    let record = Record::new(collection, fields);
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
    insert_record(tx, &record).await?;
    Ok(record)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
    fetch_record(tx, collection, id).await
  }

  async fn update(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
  ) -> Result<Record, StoreError> {
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
    merge_record(tx, collection, id, fields).await
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
    delete_record(tx, collection, id).await
  }

  async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
    let mut guard = self.tx.lock().await;
    let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
    list_records(tx, collection).await
  }
}

#[async_trait]
impl Transaction for SqliteTransaction {
  async fn commit(self: Box<Self>) -> Result<(), StoreError> {
    let tx = self.tx.lock().await.take();
    match tx {
      Some(tx) => Ok(tx.commit().await?),
      None => Err(StoreError::TransactionClosed),
    }
  }

  async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
    let tx = self.tx.lock().await.take();
    match tx {
      Some(tx) => Ok(tx.rollback().await?),
      None => Err(StoreError::TransactionClosed),
    }
  }
}

#[cfg(test)]
mod tests {
  use orchestra_config::{NodeDef, WorkflowDef};
  use orchestra_workflow::{SessionStatus, VisitOutcome, Workflow};

  use super::*;

  async fn store(dir: &tempfile::TempDir) -> SqliteStore {
    let url = format!("sqlite://{}", dir.path().join("orchestra.db").display());
    SqliteStore::connect(&url).await.unwrap()
  }

  fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
  }

  #[tokio::test]
  async fn test_record_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;

    let created = store
      .create("campaigns", fields(serde_json::json!({ "name": "Spring" })))
      .await
      .unwrap();
    store
      .update(
        "campaigns",
        &created.id,
        fields(serde_json::json!({ "status": "active" })),
      )
      .await
      .unwrap();

    let fetched = store.get("campaigns", &created.id).await.unwrap();
    assert_eq!(fetched.str_field("name"), Some("Spring"));
    assert_eq!(fetched.str_field("status"), Some("active"));
    assert_eq!(store.list("campaigns").await.unwrap().len(), 1);

    store.delete("campaigns", &created.id).await.unwrap();
    assert!(
      store
        .delete("campaigns", &created.id)
        .await
        .unwrap_err()
        .is_not_found()
    );
  }

  #[tokio::test]
  async fn test_uncommitted_transaction_is_rolled_back_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;

    let id = {
      let tx = store.begin().await.unwrap();
      tx.create("projects", Fields::new()).await.unwrap().id
    };
    assert!(store.get("projects", &id).await.unwrap_err().is_not_found());

    let tx = store.begin().await.unwrap();
    let id = tx.create("projects", Fields::new()).await.unwrap().id;
    tx.commit().await.unwrap();
    assert!(store.get("projects", &id).await.is_ok());
  }

  #[tokio::test]
  async fn test_session_upsert() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir).await;
    let workflow = Workflow::from_def(WorkflowDef {
      workflow_id: "wf".to_string(),
      name: "Test".to_string(),
      version: 1,
      start_node: None,
      nodes: vec![NodeDef {
        node_id: "start".to_string(),
        node_type: "start".to_string(),
        data: serde_json::json!({}),
        next: vec![],
        collaborator: None,
        max_retry_attempts: None,
      }],
    })
    .unwrap();

    let mut session = WorkflowSession::new(&workflow, Fields::new());
    store.save_session(&session).await.unwrap();
    session.record_visit("start", VisitOutcome::Completed);
    store.save_session(&session).await.unwrap();

    let loaded = store.get_session(&session.session_id).await.unwrap();
    assert_eq!(loaded.status, SessionStatus::Completed);
    assert_eq!(store.list_sessions("wf").await.unwrap().len(), 1);
  }
}
