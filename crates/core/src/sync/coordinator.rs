//! Drain/replay protocol and background engine.
//!
//! A drain replays queued actions oldest-first and stops at the first action
//! that does not come back 2xx. The failing action and everything behind it
//! stay queued; the next drain starts again from the failing one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;

use super::action_model::{DrainOutcome, DrainState, DrainTrigger, SyncStatus};
use super::connectivity::{ConnectivityMonitor, ConnectivityTransition};
use super::pending_queue::PendingActionQueue;
use super::retry_policy::backoff_seconds;
use super::transport::RemoteTransport;
use crate::config::SyncConfig;

#[derive(Debug, Default)]
struct DrainSignalInner {
    notify: Notify,
    pending: AtomicBool,
}

/// Wake-up handle for the background engine.
///
/// Notifications are sticky: a notify with nobody waiting is consumed by the
/// next wait.
#[derive(Debug, Clone, Default)]
pub struct DrainSignal {
    inner: Arc<DrainSignalInner>,
}

impl DrainSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.inner.notify.notified().await;
        self.inner.pending.store(false, Ordering::SeqCst);
    }
}

pub struct SyncCoordinator {
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<dyn PendingActionQueue>,
    transport: Arc<dyn RemoteTransport>,
    config: SyncConfig,
    drain_lock: Mutex<()>,
    status: StdMutex<SyncStatus>,
    signal: DrainSignal,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        queue: Arc<dyn PendingActionQueue>,
        transport: Arc<dyn RemoteTransport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            monitor,
            queue,
            transport,
            config,
            drain_lock: Mutex::new(()),
            status: StdMutex::new(SyncStatus::default()),
            signal: DrainSignal::new(),
            background_task: Mutex::new(None),
        }
    }

    /// Handle that wakes the background engine (see
    /// [`super::OfflineAwareRequest::with_drain_signal`]).
    pub fn drain_signal(&self) -> DrainSignal {
        self.signal.clone()
    }

    /// Drain if online and there is anything to replay.
    pub async fn drain(&self, trigger: DrainTrigger) -> DrainOutcome {
        if !self.monitor.is_online() {
            debug!("[OfflineSync] Skipping {:?} drain while offline", trigger);
            return DrainOutcome::Offline;
        }
        match self.queue.count() {
            Ok(0) => {
                self.update_status(|status| status.pending_count = 0);
                return DrainOutcome::Completed { replayed: 0 };
            }
            Ok(_) => {}
            Err(err) => warn!("[OfflineSync] Could not read pending count: {}", err),
        }
        self.run_drain(trigger).await
    }

    /// Manual "sync now": attempts a drain even if the monitor says offline,
    /// since the platform signal may lag behind reality.
    pub async fn sync_now(&self) -> DrainOutcome {
        self.run_drain(DrainTrigger::Manual).await
    }

    async fn run_drain(&self, trigger: DrainTrigger) -> DrainOutcome {
        let Ok(_drain_guard) = self.drain_lock.try_lock() else {
            debug!("[OfflineSync] Drain already running, ignoring {:?} trigger", trigger);
            return DrainOutcome::AlreadyDraining;
        };

        self.update_status(|status| status.state = DrainState::Draining);
        debug!("[OfflineSync] Drain started (trigger={:?})", trigger);

        let mut replayed = 0usize;
        let outcome = loop {
            let action = match self.queue.peek_oldest() {
                Ok(Some(action)) => action,
                Ok(None) => break DrainOutcome::Completed { replayed },
                Err(err) => {
                    break DrainOutcome::Halted {
                        replayed,
                        action_id: None,
                        reason: format!("Failed to read pending queue: {}", err),
                    };
                }
            };

            let failure = match self.transport.send(&action.payload).await {
                Ok(response) if response.is_success() => {
                    match self.queue.remove_by_id(action.id).await {
                        Ok(_) => {
                            replayed += 1;
                            debug!(
                                "[OfflineSync] Replayed action {} ({} {})",
                                action.id, action.payload.method, action.payload.target_url
                            );
                            continue;
                        }
                        Err(err) => {
                            // Delivered but still queued: it will be replayed
                            // again on the next drain (at-least-once).
                            break DrainOutcome::Halted {
                                replayed,
                                action_id: Some(action.id),
                                reason: format!(
                                    "Action delivered but could not be dequeued: {}",
                                    err
                                ),
                            };
                        }
                    }
                }
                Ok(response) => format!("Remote rejected action with HTTP {}", response.status),
                Err(err) => err.to_string(),
            };

            if let Err(err) = self.queue.record_failure(action.id, failure.clone()).await {
                warn!(
                    "[OfflineSync] Failed to record replay failure for action {}: {}",
                    action.id, err
                );
            }
            break DrainOutcome::Halted {
                replayed,
                action_id: Some(action.id),
                reason: failure,
            };
        };

        self.finish_drain(&outcome);
        outcome
    }

    fn finish_drain(&self, outcome: &DrainOutcome) {
        let pending_count = self.queue.count().ok();
        let retry_enabled = self.config.retry_while_online;
        let base_delay = self.config.retry_base_delay_secs;

        self.update_status(|status| {
            let now = Utc::now();
            status.state = DrainState::Idle;
            status.last_drain_at = Some(now);
            status.last_outcome = Some(outcome.status_code().to_string());
            if let Some(count) = pending_count {
                status.pending_count = count;
            }
            match outcome {
                DrainOutcome::Halted { reason, .. } => {
                    let failures = status.consecutive_failures;
                    status.last_error = Some(reason.clone());
                    status.next_retry_at = retry_enabled.then(|| {
                        now + chrono::Duration::seconds(backoff_seconds(failures, base_delay))
                    });
                    status.consecutive_failures = failures + 1;
                }
                _ => {
                    status.last_error = None;
                    status.next_retry_at = None;
                    status.consecutive_failures = 0;
                }
            }
        });

        match outcome {
            DrainOutcome::Halted {
                replayed,
                action_id,
                reason,
            } => info!(
                "[OfflineSync] Drain halted after {} replayed at action {:?}: {}",
                replayed, action_id, reason
            ),
            other => info!(
                "[OfflineSync] Drain finished status={} replayed={}",
                other.status_code(),
                other.replayed()
            ),
        }
    }

    /// Current engine status with a fresh pending count.
    pub fn status(&self) -> SyncStatus {
        if let Ok(count) = self.queue.count() {
            self.update_status(|status| status.pending_count = count);
        }
        match self.status.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) {
        let mut guard = match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
    }

    fn retry_delay(&self, outcome: &DrainOutcome) -> Option<Duration> {
        if !self.config.retry_while_online || !outcome.is_halted() || !self.monitor.is_online() {
            return None;
        }
        let failures = self.status().consecutive_failures;
        let secs = backoff_seconds((failures - 1).max(0), self.config.retry_base_delay_secs);
        Some(Duration::from_secs(secs.unsigned_abs()))
    }

    async fn next_trigger(
        &self,
        transitions: &mut broadcast::Receiver<ConnectivityTransition>,
        mut retry_in: Option<Duration>,
    ) -> Option<DrainTrigger> {
        loop {
            let retry_sleep = async move {
                match retry_in {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                event = transitions.recv() => match event {
                    Ok(ConnectivityTransition::Online) => return Some(DrainTrigger::Reconnect),
                    Ok(ConnectivityTransition::Offline) => {
                        retry_in = None;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("[OfflineSync] Missed {} connectivity events", skipped);
                        if self.monitor.is_online() {
                            return Some(DrainTrigger::Reconnect);
                        }
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = self.signal.wait() => return Some(DrainTrigger::LocalMutation),
                _ = retry_sleep => return Some(DrainTrigger::Retry),
            }
        }
    }

    /// Spawn the background engine: drain at startup, on every reconnect, on
    /// local wake-ups, and after backoff while online following a halt.
    /// No-op if already running.
    pub async fn start_background(self: &Arc<Self>) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let coordinator = Arc::clone(self);
        let mut transitions = self.monitor.subscribe();
        let handle = tokio::spawn(async move {
            let mut trigger = DrainTrigger::Startup;
            loop {
                let mut outcome = coordinator.drain(trigger).await;
                while outcome == DrainOutcome::AlreadyDraining {
                    // The running drain may have taken its last look at the
                    // queue before this trigger's action landed; go again
                    // once it is done.
                    drop(coordinator.drain_lock.lock().await);
                    outcome = coordinator.drain(trigger).await;
                }
                let retry_in = coordinator.retry_delay(&outcome);
                if let Some(delay) = retry_in {
                    debug!("[OfflineSync] Next retry in {:?}", delay);
                }
                match coordinator.next_trigger(&mut transitions, retry_in).await {
                    Some(next) => trigger = next,
                    None => {
                        info!("[OfflineSync] Connectivity monitor closed. Stopping background engine.");
                        break;
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    pub async fn stop_background(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    pub async fn is_background_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
