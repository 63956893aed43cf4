//! Remote fetch with offline fallback to the local record store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::contract_model::{CachedRecord, ContractRecordSnapshot};
use super::record_store::LocalRecordStore;
use super::routes::ContractRoutes;
use crate::errors::{Error, Result};
use crate::sync::{ActionPayload, ConnectivityMonitor, PendingActionQueue, RemoteTransport};

/// JSON field linking a contract to its job.
pub const JOB_FOREIGN_KEY: &str = "jobId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Remote,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedContract {
    pub snapshot: ContractRecordSnapshot,
    pub source: RecordSource,
    pub cached_at: Option<DateTime<Utc>>,
}

impl LoadedContract {
    fn from_cache(record: CachedRecord) -> Self {
        Self {
            snapshot: record.snapshot,
            source: RecordSource::Cache,
            cached_at: Some(record.cached_at),
        }
    }
}

pub struct ContractRecordCache {
    store: Arc<dyn LocalRecordStore>,
    transport: Arc<dyn RemoteTransport>,
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<dyn PendingActionQueue>,
    routes: ContractRoutes,
}

impl ContractRecordCache {
    pub fn new(
        store: Arc<dyn LocalRecordStore>,
        transport: Arc<dyn RemoteTransport>,
        monitor: Arc<ConnectivityMonitor>,
        queue: Arc<dyn PendingActionQueue>,
        routes: ContractRoutes,
    ) -> Self {
        Self {
            store,
            transport,
            monitor,
            queue,
            routes,
        }
    }

    pub fn routes(&self) -> &ContractRoutes {
        &self.routes
    }

    /// Latest snapshot for `contract_id`: remote when reachable, otherwise
    /// the cached copy. `Error::Unavailable` when neither has it.
    pub async fn fetch(&self, contract_id: &str) -> Result<LoadedContract> {
        if let Some(remote) = self.fetch_remote(contract_id).await {
            if self.has_pending_actions(contract_id) {
                // Queued local edits are not on the server yet; the remote
                // copy predates them.
                if let Some(record) = self.cached(contract_id) {
                    debug!(
                        "[OfflineSync] Contract {} has queued edits, keeping cached copy",
                        contract_id
                    );
                    return Ok(LoadedContract::from_cache(record));
                }
            }
            let cached = self.store(&remote).await;
            return Ok(LoadedContract {
                snapshot: remote,
                source: RecordSource::Remote,
                cached_at: cached.map(|record| record.cached_at),
            });
        }

        self.cached(contract_id)
            .map(LoadedContract::from_cache)
            .ok_or_else(|| Error::Unavailable(contract_id.to_string()))
    }

    /// Best-effort cache write. Storage failures are logged and ignored.
    pub async fn store(&self, snapshot: &ContractRecordSnapshot) -> Option<CachedRecord> {
        match self.store.put(&snapshot.id, snapshot.clone()).await {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(
                    "[OfflineSync] Failed to cache contract {}: {}",
                    snapshot.id, err
                );
                None
            }
        }
    }

    /// Cached copy, with storage failures treated as a miss.
    pub fn cached(&self, contract_id: &str) -> Option<CachedRecord> {
        match self.store.get(contract_id) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "[OfflineSync] Cache read failed for contract {}, treating as miss: {}",
                    contract_id, err
                );
                None
            }
        }
    }

    /// Contracts of a job for listing views. Falls back to cached records
    /// when the remote list cannot be fetched.
    pub async fn list_for_job(&self, job_id: &str) -> Vec<ContractRecordSnapshot> {
        if self.monitor.is_online() {
            let payload = ActionPayload::get(self.routes.job_contracts(job_id));
            match self.transport.send(&payload).await {
                Ok(response) if response.is_success() => {
                    match response
                        .body
                        .map(serde_json::from_value::<Vec<ContractRecordSnapshot>>)
                    {
                        Some(Ok(remote)) => {
                            let mut listed = Vec::with_capacity(remote.len());
                            for snapshot in remote {
                                if self.has_pending_actions(&snapshot.id) {
                                    if let Some(record) = self.cached(&snapshot.id) {
                                        listed.push(record.snapshot);
                                        continue;
                                    }
                                }
                                self.store(&snapshot).await;
                                listed.push(snapshot);
                            }
                            return listed;
                        }
                        Some(Err(err)) => warn!(
                            "[OfflineSync] Could not decode contracts of job {}: {}",
                            job_id, err
                        ),
                        None => warn!("[OfflineSync] Empty contract list body for job {}", job_id),
                    }
                }
                Ok(response) => debug!(
                    "[OfflineSync] Listing job {} answered {}, using cache",
                    job_id, response.status
                ),
                Err(err) => debug!(
                    "[OfflineSync] Listing job {} failed ({}), using cache",
                    job_id, err
                ),
            }
        }

        match self.store.list_by_foreign_key(JOB_FOREIGN_KEY, job_id) {
            Ok(records) => records.into_iter().map(|record| record.snapshot).collect(),
            Err(err) => {
                warn!(
                    "[OfflineSync] Cache listing failed for job {}, treating as empty: {}",
                    job_id, err
                );
                Vec::new()
            }
        }
    }

    async fn fetch_remote(&self, contract_id: &str) -> Option<ContractRecordSnapshot> {
        if !self.monitor.is_online() {
            return None;
        }
        let payload = ActionPayload::get(self.routes.contract(contract_id));
        match self.transport.send(&payload).await {
            Ok(response) if response.is_success() => {
                let body = response.body?;
                match serde_json::from_value::<ContractRecordSnapshot>(body) {
                    Ok(snapshot) if snapshot.id == contract_id => Some(snapshot),
                    Ok(snapshot) => {
                        warn!(
                            "[OfflineSync] Remote returned contract {} for {}, ignoring",
                            snapshot.id, contract_id
                        );
                        None
                    }
                    Err(err) => {
                        warn!(
                            "[OfflineSync] Could not decode contract {}: {}",
                            contract_id, err
                        );
                        None
                    }
                }
            }
            Ok(response) => {
                debug!(
                    "[OfflineSync] Fetch of contract {} answered {}, falling back to cache",
                    contract_id, response.status
                );
                None
            }
            Err(err) => {
                debug!(
                    "[OfflineSync] Fetch of contract {} failed ({}), falling back to cache",
                    contract_id, err
                );
                None
            }
        }
    }

    fn has_pending_actions(&self, contract_id: &str) -> bool {
        match self.queue.has_actions_under(&self.routes.contract(contract_id)) {
            Ok(pending) => pending,
            Err(err) => {
                warn!("[OfflineSync] Could not scan pending actions: {}", err);
                false
            }
        }
    }
}
