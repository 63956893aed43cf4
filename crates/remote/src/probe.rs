//! Periodic reachability check that drives the connectivity monitor.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use fieldkit_core::sync::{ActionPayload, ConnectivityMonitor};

use crate::client::ContractApiClient;

/// Path probed when no explicit health URL is configured.
pub const DEFAULT_HEALTH_PATH: &str = "/api/health";

/// Polls a health endpoint and reports the result to a
/// [`ConnectivityMonitor`]. Any HTTP response counts as reachable: a 5xx
/// still proves the network path works, and the drain protocol deals with
/// the status itself.
pub struct ReachabilityProbe {
    client: ContractApiClient,
    health_url: String,
    monitor: Arc<ConnectivityMonitor>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReachabilityProbe {
    pub fn new(
        client: ContractApiClient,
        monitor: Arc<ConnectivityMonitor>,
        interval: Duration,
    ) -> Self {
        let health_url = format!("{}{}", client.base_url(), DEFAULT_HEALTH_PATH);
        Self {
            client,
            health_url,
            monitor,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn with_health_url(mut self, health_url: impl Into<String>) -> Self {
        self.health_url = health_url.into();
        self
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Probe once and feed the result to the monitor. Returns reachability.
    pub async fn check_once(&self) -> bool {
        let reachable = match self
            .client
            .execute(&ActionPayload::get(self.health_url.clone()))
            .await
        {
            Ok(response) => {
                debug!(
                    "[OfflineSync] Health check answered {}",
                    response.status
                );
                true
            }
            Err(err) => {
                debug!("[OfflineSync] Health check failed: {}", err);
                false
            }
        };
        if self.monitor.set_reachable(reachable) {
            info!(
                "[OfflineSync] Connectivity changed: {}",
                if reachable { "online" } else { "offline" }
            );
        }
        reachable
    }

    /// Start polling. No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let probe = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(probe.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                probe.check_once().await;
            }
        }));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
