//! Per-screen controller for one contract: optimistic edits, cache
//! write-back and debounced saves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, warn};
use serde_json::json;
use tokio::sync::Mutex;

use super::contract_model::ContractRecordSnapshot;
use super::debounce::SaveDebouncer;
use super::record_cache::{ContractRecordCache, LoadedContract};
use crate::errors::{Error, Result};
use crate::sync::{
    ActionPayload, OfflineAwareRequest, RequestOutcome, ACTION_KIND_UPDATE_BLOCKS,
    ACTION_KIND_UPDATE_STATUS,
};

pub struct LiveContractSession {
    contract_id: String,
    cache: Arc<ContractRecordCache>,
    request: Arc<OfflineAwareRequest>,
    debouncer: SaveDebouncer,
    working: StdMutex<Option<ContractRecordSnapshot>>,
    /// Held for the duration of every outbound mutation.
    save_lock: Mutex<()>,
    closed: AtomicBool,
}

impl LiveContractSession {
    pub fn new(
        contract_id: impl Into<String>,
        cache: Arc<ContractRecordCache>,
        request: Arc<OfflineAwareRequest>,
        debouncer: SaveDebouncer,
    ) -> Arc<Self> {
        Arc::new(Self {
            contract_id: contract_id.into(),
            cache,
            request,
            debouncer,
            working: StdMutex::new(None),
            save_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    /// Current working snapshot, if loaded.
    pub fn snapshot(&self) -> Option<ContractRecordSnapshot> {
        self.working().clone()
    }

    pub fn has_pending_save(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Fetch the contract (remote, falling back to the cache) and adopt it as
    /// the working snapshot. `Error::Unavailable` when neither has it.
    pub async fn load(&self) -> Result<LoadedContract> {
        self.ensure_open()?;
        let loaded = self.cache.fetch(&self.contract_id).await?;
        debug!(
            "[OfflineSync] Loaded contract {} from {:?}",
            self.contract_id, loaded.source
        );
        *self.working() = Some(loaded.snapshot.clone());
        Ok(loaded)
    }

    /// Merge `patch` into a block's content right away, persist the working
    /// snapshot to the cache and schedule a debounced save.
    pub async fn mutate_block(
        self: &Arc<Self>,
        block_id: &str,
        patch: &serde_json::Value,
    ) -> Result<ContractRecordSnapshot> {
        self.ensure_open()?;
        let updated = {
            let mut working = self.working();
            let snapshot = working
                .as_mut()
                .ok_or_else(|| Error::Unavailable(self.contract_id.clone()))?;
            snapshot.apply_block_patch(block_id, patch)?;
            snapshot.clone()
        };
        self.cache.store(&updated).await;

        // The firing keeps the session alive so a session dropped inside the
        // quiet window still delivers (or queues) its last edit.
        let session = Arc::clone(self);
        self.debouncer.schedule(async move {
            if let Err(err) = session.save_blocks().await {
                warn!(
                    "[OfflineSync] Debounced save of contract {} failed: {}",
                    session.contract_id, err
                );
            }
        });
        Ok(updated)
    }

    /// Mark the contract completed. Any pending block save goes out first so
    /// the server sees the final blocks before the status change.
    pub async fn complete_contract(&self) -> Result<RequestOutcome> {
        self.ensure_open()?;
        self.flush().await?;

        let _save_guard = self.save_lock.lock().await;
        let completed = {
            let mut working = self.working();
            let snapshot = working
                .as_mut()
                .ok_or_else(|| Error::Unavailable(self.contract_id.clone()))?;
            snapshot.mark_completed();
            snapshot.clone()
        };
        self.cache.store(&completed).await;

        let payload = ActionPayload::patch(
            self.cache.routes().contract_status(&self.contract_id),
            json!({ "status": completed.status }),
        );
        let outcome = self.request.send(ACTION_KIND_UPDATE_STATUS, payload).await?;
        self.write_back().await;
        Ok(outcome)
    }

    /// Send the pending debounced save now. Waits for an in-flight save when
    /// nothing is pending. Returns the outcome of the save it performed.
    pub async fn flush(&self) -> Result<Option<RequestOutcome>> {
        if self.debouncer.cancel() {
            return self.save_blocks().await;
        }
        drop(self.save_lock.lock().await);
        Ok(None)
    }

    /// Flush, then refuse further mutations.
    pub async fn close(&self) -> Result<()> {
        let flushed = self.flush().await;
        self.closed.store(true, Ordering::SeqCst);
        debug!("[OfflineSync] Closed session for contract {}", self.contract_id);
        flushed.map(|_| ())
    }

    async fn save_blocks(&self) -> Result<Option<RequestOutcome>> {
        let _save_guard = self.save_lock.lock().await;
        let Some(snapshot) = self.snapshot() else {
            return Ok(None);
        };

        let payload = ActionPayload::patch(
            self.cache.routes().contract(&snapshot.id),
            json!({ "filledBlocks": serde_json::to_value(&snapshot.blocks)? }),
        );
        let outcome = self.request.send(ACTION_KIND_UPDATE_BLOCKS, payload).await?;
        match &outcome {
            RequestOutcome::Delivered(_) => {
                debug!("[OfflineSync] Saved blocks of contract {}", snapshot.id)
            }
            RequestOutcome::Queued(action) => debug!(
                "[OfflineSync] Blocks of contract {} queued as action {}",
                snapshot.id, action.id
            ),
            RequestOutcome::Rejected(response) => warn!(
                "[OfflineSync] Blocks of contract {} rejected with status {}",
                snapshot.id, response.status
            ),
        }
        self.write_back().await;
        Ok(Some(outcome))
    }

    /// Re-write the cache with whatever the working snapshot holds now.
    async fn write_back(&self) {
        if let Some(current) = self.snapshot() {
            self.cache.store(&current).await;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::validation(format!(
                "Session for contract '{}' is closed",
                self.contract_id
            )));
        }
        Ok(())
    }

    fn working(&self) -> std::sync::MutexGuard<'_, Option<ContractRecordSnapshot>> {
        match self.working.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{
        ContractRoutes, ContractStatus, LocalRecordStore, ManualScheduler, TokioScheduler,
    };
    use crate::memory::{InMemoryActionQueue, InMemoryRecordStore};
    use crate::sync::test_support::{ScriptedTransport, TransportScript};
    use crate::sync::{ConnectivityMonitor, HttpMethod, PendingActionQueue};
    use serde_json::Value;
    use std::time::Duration;

    const BASE: &str = "https://api.example.test";

    fn snapshot_json(text: &str) -> Value {
        json!({
            "id": "c-1",
            "status": "in_progress",
            "jobId": "job-1",
            "blocks": [
                { "id": "b-1", "type": "text", "content": { "text": text } },
                { "id": "b-2", "type": "signature", "content": {} }
            ]
        })
    }

    struct Fixture {
        session: Arc<LiveContractSession>,
        scheduler: ManualScheduler,
        transport: Arc<ScriptedTransport>,
        store: InMemoryRecordStore,
        queue: InMemoryActionQueue,
    }

    fn fixture(online: bool, script: Vec<TransportScript>) -> Fixture {
        let store = InMemoryRecordStore::new();
        let queue = InMemoryActionQueue::new();
        let transport = Arc::new(ScriptedTransport::new(script));
        let monitor = Arc::new(ConnectivityMonitor::new(Some(online)));
        let cache = Arc::new(ContractRecordCache::new(
            Arc::new(store.clone()),
            transport.clone(),
            monitor.clone(),
            Arc::new(queue.clone()),
            ContractRoutes::new(BASE),
        ));
        let request = Arc::new(OfflineAwareRequest::new(
            monitor,
            Arc::new(queue.clone()),
            transport.clone(),
        ));
        let scheduler = ManualScheduler::new();
        let debouncer = SaveDebouncer::new(Duration::from_millis(1000), Arc::new(scheduler.clone()));
        Fixture {
            session: LiveContractSession::new("c-1", cache, request, debouncer),
            scheduler,
            transport,
            store,
            queue,
        }
    }

    fn patches(transport: &ScriptedTransport) -> Vec<ActionPayload> {
        transport
            .sent()
            .into_iter()
            .filter(|payload| payload.method == HttpMethod::Patch)
            .collect()
    }

    fn first_block_text(payload: &ActionPayload) -> Option<String> {
        payload.body.as_ref()?["filledBlocks"][0]["content"]["text"]
            .as_str()
            .map(str::to_string)
    }

    #[tokio::test]
    async fn rapid_edits_coalesce_into_one_save_with_latest_content() {
        let f = fixture(true, vec![TransportScript::Json(200, snapshot_json("initial"))]);
        f.session.load().await.expect("load");

        for i in 1..=5 {
            f.session
                .mutate_block("b-1", &json!({ "text": format!("edit {}", i) }))
                .await
                .expect("mutate");
        }
        assert!(patches(&f.transport).is_empty(), "no save inside the quiet window");
        let cached = f.store.get("c-1").expect("get").expect("cached");
        assert_eq!(cached.snapshot.blocks[0].content["text"], "edit 5");

        f.scheduler.fire_all().await;

        let sent = patches(&f.transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target_url, format!("{}/api/contracts/c-1", BASE));
        assert_eq!(first_block_text(&sent[0]).as_deref(), Some("edit 5"));
        assert!(!f.session.has_pending_save());
    }

    #[tokio::test]
    async fn offline_load_adopts_cached_copy() {
        let f = fixture(false, vec![]);
        let cached: ContractRecordSnapshot =
            serde_json::from_value(snapshot_json("from cache")).expect("snapshot");
        f.store.put("c-1", cached.clone()).await.expect("seed");

        let loaded = f.session.load().await.expect("load");
        assert_eq!(loaded.snapshot, cached);
        assert_eq!(f.session.snapshot(), Some(cached));
        assert!(f.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn load_without_any_copy_is_unavailable() {
        let f = fixture(false, vec![]);
        let err = f.session.load().await.expect_err("unavailable");
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(err.is_user_visible());

        let err = f
            .session
            .mutate_block("b-1", &json!({ "text": "x" }))
            .await
            .expect_err("nothing loaded");
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn offline_edits_are_queued_and_cached() {
        let f = fixture(false, vec![]);
        let cached: ContractRecordSnapshot =
            serde_json::from_value(snapshot_json("before")).expect("snapshot");
        f.store.put("c-1", cached).await.expect("seed");
        f.session.load().await.expect("load");

        f.session
            .mutate_block("b-1", &json!({ "text": "offline" }))
            .await
            .expect("mutate");
        f.scheduler.fire_all().await;

        let queued = f.queue.list(10).expect("list");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, ACTION_KIND_UPDATE_BLOCKS);
        assert_eq!(first_block_text(&queued[0].payload).as_deref(), Some("offline"));
        let cached = f.store.get("c-1").expect("get").expect("cached");
        assert_eq!(cached.snapshot.blocks[0].content["text"], "offline");
    }

    #[tokio::test]
    async fn completing_sends_pending_blocks_before_status() {
        let f = fixture(true, vec![TransportScript::Json(200, snapshot_json("initial"))]);
        f.session.load().await.expect("load");
        f.session
            .mutate_block("b-2", &json!({ "signedBy": "Technician" }))
            .await
            .expect("mutate");

        let outcome = f.session.complete_contract().await.expect("complete");
        assert!(matches!(outcome, RequestOutcome::Delivered(_)));

        let sent = patches(&f.transport);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].target_url, format!("{}/api/contracts/c-1", BASE));
        assert_eq!(sent[1].target_url, format!("{}/api/contracts/c-1/status", BASE));
        assert_eq!(sent[1].body, Some(json!({ "status": "completed" })));

        // The superseded debounce firing must not produce another save.
        f.scheduler.fire_all().await;
        assert_eq!(patches(&f.transport).len(), 2);

        let cached = f.store.get("c-1").expect("get").expect("cached");
        assert_eq!(cached.snapshot.status, ContractStatus::Completed);
        assert!(cached.snapshot.completed_at.is_some());
    }

    #[tokio::test]
    async fn completing_offline_queues_both_actions_in_order() {
        let f = fixture(false, vec![]);
        let cached: ContractRecordSnapshot =
            serde_json::from_value(snapshot_json("before")).expect("snapshot");
        f.store.put("c-1", cached).await.expect("seed");
        f.session.load().await.expect("load");
        f.session
            .mutate_block("b-1", &json!({ "text": "final" }))
            .await
            .expect("mutate");

        let outcome = f.session.complete_contract().await.expect("complete");
        assert!(outcome.is_queued());

        let kinds = f
            .queue
            .list(10)
            .expect("list")
            .into_iter()
            .map(|action| action.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![ACTION_KIND_UPDATE_BLOCKS, ACTION_KIND_UPDATE_STATUS]);
    }

    #[tokio::test]
    async fn edit_during_in_flight_save_is_sent_next() {
        let f = fixture(
            true,
            vec![
                TransportScript::Json(200, snapshot_json("initial")),
                TransportScript::Delayed {
                    status: 200,
                    delay_ms: 200,
                },
            ],
        );
        f.session.load().await.expect("load");
        f.session
            .mutate_block("b-1", &json!({ "text": "first" }))
            .await
            .expect("mutate");

        let flushing = Arc::clone(&f.session);
        let in_flight = tokio::spawn(async move { flushing.flush().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        f.session
            .mutate_block("b-1", &json!({ "text": "second" }))
            .await
            .expect("mutate during save");
        f.scheduler.fire_all().await;
        in_flight.await.expect("join").expect("flush");

        let texts = patches(&f.transport)
            .iter()
            .map(|payload| first_block_text(payload).unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_still_sends_the_last_edit() {
        let queue = InMemoryActionQueue::new();
        let transport = Arc::new(ScriptedTransport::new(vec![TransportScript::Json(
            200,
            snapshot_json("initial"),
        )]));
        let monitor = Arc::new(ConnectivityMonitor::new(Some(true)));
        let cache = Arc::new(ContractRecordCache::new(
            Arc::new(InMemoryRecordStore::new()),
            transport.clone(),
            monitor.clone(),
            Arc::new(queue.clone()),
            ContractRoutes::new(BASE),
        ));
        let request = Arc::new(OfflineAwareRequest::new(
            monitor,
            Arc::new(queue.clone()),
            transport.clone(),
        ));
        let debouncer = SaveDebouncer::new(Duration::from_millis(1000), Arc::new(TokioScheduler));
        let session = LiveContractSession::new("c-1", cache, request, debouncer);

        session.load().await.expect("load");
        session
            .mutate_block("b-1", &json!({ "text": "edited" }))
            .await
            .expect("mutate");
        drop(session);

        tokio::time::sleep(Duration::from_secs(5)).await;

        let sent = patches(&transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(queue.count().expect("count"), 0);
        assert_eq!(first_block_text(&sent[0]).as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn close_flushes_and_rejects_further_edits() {
        let f = fixture(true, vec![TransportScript::Json(200, snapshot_json("initial"))]);
        f.session.load().await.expect("load");
        f.session
            .mutate_block("b-1", &json!({ "text": "last words" }))
            .await
            .expect("mutate");

        f.session.close().await.expect("close");
        assert_eq!(patches(&f.transport).len(), 1);

        let err = f
            .session
            .mutate_block("b-1", &json!({ "text": "too late" }))
            .await
            .expect_err("closed");
        assert!(matches!(err, Error::Validation(_)));
    }
}
