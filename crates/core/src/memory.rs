//! In-memory store backends.
//!
//! Used by tests and by hosts that do not need persistence across restarts.
//! Cloning a store (or calling [`InMemoryActionQueue::reopen`]) shares the same
//! underlying log, which is how tests simulate a process restart over a
//! durable medium. Failure switches emulate a storage medium that errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::contracts::{
    validate_foreign_key_name, CachedRecord, ContractRecordSnapshot, LocalRecordStore,
};
use crate::errors::{DatabaseError, Error, Result};
use crate::sync::{url_is_under, ActionPayload, PendingActionQueue, QueuedAction};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Database(DatabaseError::Internal(format!("{} lock is poisoned", name))))
}

fn injected_failure(operation: &str) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!(
        "injected storage failure during {}",
        operation
    )))
}

#[derive(Debug, Default)]
struct QueueLog {
    next_id: i64,
    actions: BTreeMap<i64, QueuedAction>,
}

#[derive(Debug, Default)]
struct QueueFaults {
    fail_writes: AtomicBool,
    fail_removes: AtomicUsize,
}

/// FIFO queue kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActionQueue {
    log: Arc<Mutex<QueueLog>>,
    faults: Arc<QueueFaults>,
}

impl InMemoryActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh handle over the same log, as if the process had restarted.
    pub fn reopen(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            faults: Arc::new(QueueFaults::default()),
        }
    }

    /// Make every `enqueue` fail until switched off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `remove_by_id` fail without removing.
    pub fn fail_next_removes(&self, n: usize) {
        self.faults.fail_removes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl PendingActionQueue for InMemoryActionQueue {
    async fn enqueue(&self, kind: &str, payload: ActionPayload) -> Result<QueuedAction> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(injected_failure("enqueue"));
        }
        let mut log = lock(&self.log, "Queue")?;
        log.next_id += 1;
        let action = QueuedAction {
            id: log.next_id,
            kind: kind.to_string(),
            payload,
            enqueued_at: Utc::now(),
            attempt_count: 0,
            last_error: None,
            last_attempt_at: None,
        };
        log.actions.insert(action.id, action.clone());
        Ok(action)
    }

    fn peek_oldest(&self) -> Result<Option<QueuedAction>> {
        let log = lock(&self.log, "Queue")?;
        Ok(log.actions.values().next().cloned())
    }

    async fn remove_by_id(&self, id: i64) -> Result<bool> {
        let pending_failures = self.faults.fail_removes.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.faults
                .fail_removes
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(injected_failure("remove"));
        }
        let mut log = lock(&self.log, "Queue")?;
        Ok(log.actions.remove(&id).is_some())
    }

    fn count(&self) -> Result<i64> {
        let log = lock(&self.log, "Queue")?;
        Ok(log.actions.len() as i64)
    }

    fn list(&self, limit: i64) -> Result<Vec<QueuedAction>> {
        let log = lock(&self.log, "Queue")?;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(log.actions.values().take(limit).cloned().collect())
    }

    fn has_actions_under(&self, url_root: &str) -> Result<bool> {
        let log = lock(&self.log, "Queue")?;
        Ok(log
            .actions
            .values()
            .any(|action| url_is_under(&action.payload.target_url, url_root)))
    }

    async fn record_failure(&self, id: i64, error: String) -> Result<()> {
        let mut log = lock(&self.log, "Queue")?;
        if let Some(action) = log.actions.get_mut(&id) {
            action.attempt_count += 1;
            action.last_error = Some(error);
            action.last_attempt_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut log = lock(&self.log, "Queue")?;
        let discarded = log.actions.len();
        log.actions.clear();
        Ok(discarded)
    }
}

/// Contract cache kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<Mutex<HashMap<String, CachedRecord>>>,
    fail_all: Arc<AtomicBool>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail, as a broken storage medium would.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(injected_failure(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalRecordStore for InMemoryRecordStore {
    async fn put(&self, id: &str, snapshot: ContractRecordSnapshot) -> Result<CachedRecord> {
        self.check("put")?;
        let record = CachedRecord::new(snapshot);
        lock(&self.records, "Record store")?.insert(id.to_string(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<Option<CachedRecord>> {
        self.check("get")?;
        Ok(lock(&self.records, "Record store")?.get(id).cloned())
    }

    fn list_by_foreign_key(&self, key: &str, value: &str) -> Result<Vec<CachedRecord>> {
        self.check("list")?;
        validate_foreign_key_name(key)?;
        let records = lock(&self.records, "Record store")?;
        let mut matches = records
            .values()
            .filter(|record| record.snapshot.field_matches(key, value))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        Ok(matches)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.check("remove")?;
        Ok(lock(&self.records, "Record store")?.remove(id).is_some())
    }
}
