//! Database models for queued actions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldkit_core::sync::{ActionPayload, HttpMethod, QueuedAction};
use fieldkit_core::Result;

use crate::db::{timestamp_from_db, timestamp_to_db};
use crate::errors::StorageError;

#[derive(
    Queryable,
    Identifiable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::pending_actions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingActionDB {
    pub id: i64,
    pub kind: String,
    pub target_url: String,
    pub method: String,
    pub body: Option<String>,
    pub enqueued_at: String,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<String>,
}

/// Insert form; the id is assigned by SQLite (AUTOINCREMENT, never reused).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::pending_actions)]
pub struct NewPendingActionDB {
    pub kind: String,
    pub target_url: String,
    pub method: String,
    pub body: Option<String>,
    pub enqueued_at: String,
}

impl NewPendingActionDB {
    pub fn new(kind: &str, payload: &ActionPayload, enqueued_at: DateTime<Utc>) -> Result<Self> {
        let body = payload
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(Self {
            kind: kind.to_string(),
            target_url: payload.target_url.clone(),
            method: payload.method.as_str().to_string(),
            body,
            enqueued_at: timestamp_to_db(&enqueued_at),
        })
    }
}

impl TryFrom<PendingActionDB> for QueuedAction {
    type Error = fieldkit_core::Error;

    fn try_from(row: PendingActionDB) -> Result<Self> {
        let method = HttpMethod::parse(&row.method).ok_or_else(|| {
            StorageError::Decode(format!(
                "Unknown method '{}' on pending action {}",
                row.method, row.id
            ))
        })?;
        let body = row
            .body
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;
        Ok(QueuedAction {
            id: row.id,
            kind: row.kind,
            payload: ActionPayload::new(method, row.target_url, body),
            enqueued_at: timestamp_from_db(&row.enqueued_at)?,
            attempt_count: row.attempt_count,
            last_error: row.last_error,
            last_attempt_at: row
                .last_attempt_at
                .as_deref()
                .map(timestamp_from_db)
                .transpose()?,
        })
    }
}
