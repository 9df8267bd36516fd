use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
  pub id: String,
  pub collection: String,
  pub fields: Fields,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Record {
  pub(crate) fn new(collection: &str, fields: Fields) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      collection: collection.to_string(),
      fields,
      created_at: now,
      updated_at: now,
    }
  }

  pub(crate) fn merge(&mut self, fields: Fields) {
    for (key, value) in fields {
      self.fields.insert(key, value);
    }
    self.updated_at = Utc::now();
  }

  pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
    self.fields.get(key)
  }

  pub fn str_field(&self, key: &str) -> Option<&str> {
    self.fields.get(key).and_then(|v| v.as_str())
  }
}

/// A record row as stored in SQLite.
#[derive(Debug, FromRow)]
pub(crate) struct RecordRow {
  pub id: String,
  pub collection: String,
  pub fields: Json<Fields>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
  fn from(row: RecordRow) -> Self {
    Self {
      id: row.id,
      collection: row.collection,
      fields: row.fields.0,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}
