use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::debug;

use fieldkit_core::sync::{url_is_under, ActionPayload, PendingActionQueue, QueuedAction};
use fieldkit_core::Result;

use super::model::{NewPendingActionDB, PendingActionDB};
use crate::db::{get_connection, timestamp_to_db, WriteHandle};
use crate::errors::StorageError;
use crate::schema::pending_actions;

/// SQLite-backed FIFO queue of actions awaiting delivery.
///
/// Ordering is the AUTOINCREMENT row id, which SQLite never reuses, so the
/// order survives restarts and deletions.
pub struct PendingActionRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl PendingActionRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

/// Escape LIKE wildcards so ids containing `_` or `%` match literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl PendingActionQueue for PendingActionRepository {
    async fn enqueue(&self, kind: &str, payload: ActionPayload) -> Result<QueuedAction> {
        let new_row = NewPendingActionDB::new(kind, &payload, Utc::now())?;
        let row = self
            .writer
            .exec(move |conn| {
                let row = diesel::insert_into(pending_actions::table)
                    .values(&new_row)
                    .returning(PendingActionDB::as_returning())
                    .get_result::<PendingActionDB>(conn)
                    .map_err(StorageError::from)?;
                Ok(row)
            })
            .await?;
        debug!(
            "[OfflineSync] Queued action {} ({} {})",
            row.id, row.method, row.target_url
        );
        QueuedAction::try_from(row)
    }

    fn peek_oldest(&self) -> Result<Option<QueuedAction>> {
        let mut conn = get_connection(&self.pool)?;
        let row = pending_actions::table
            .order(pending_actions::id.asc())
            .select(PendingActionDB::as_select())
            .first::<PendingActionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(QueuedAction::try_from).transpose()
    }

    async fn remove_by_id(&self, action_id: i64) -> Result<bool> {
        self.writer
            .exec(move |conn| {
                let affected = diesel::delete(pending_actions::table.find(action_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = pending_actions::table
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }

    fn list(&self, limit_value: i64) -> Result<Vec<QueuedAction>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = pending_actions::table
            .order(pending_actions::id.asc())
            .limit(limit_value)
            .select(PendingActionDB::as_select())
            .load::<PendingActionDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(QueuedAction::try_from).collect()
    }

    fn has_actions_under(&self, url_root: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let escaped = escape_like(url_root);
        // LIKE folds ASCII case, so candidates are re-checked exactly.
        let candidates = pending_actions::table
            .filter(
                pending_actions::target_url
                    .eq(url_root)
                    .or(pending_actions::target_url
                        .like(format!("{}/%", escaped))
                        .escape('\\'))
                    .or(pending_actions::target_url
                        .like(format!("{}?%", escaped))
                        .escape('\\')),
            )
            .select(pending_actions::target_url)
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(candidates
            .iter()
            .any(|target_url| url_is_under(target_url, url_root)))
    }

    async fn record_failure(&self, action_id: i64, error: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(pending_actions::table.find(action_id))
                    .set((
                        pending_actions::attempt_count.eq(pending_actions::attempt_count + 1),
                        pending_actions::last_error.eq(Some(error)),
                        pending_actions::last_attempt_at.eq(Some(timestamp_to_db(&Utc::now()))),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                let removed = diesel::delete(pending_actions::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }
}
