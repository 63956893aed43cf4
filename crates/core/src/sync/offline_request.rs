//! Single chokepoint for mutating remote calls: try the network, fall back to
//! the durable queue.

use std::sync::Arc;

use log::{debug, warn};

use super::action_model::{ActionPayload, QueuedAction};
use super::connectivity::ConnectivityMonitor;
use super::coordinator::DrainSignal;
use super::pending_queue::PendingActionQueue;
use super::retry_policy::SyncRetryClass;
use super::transport::{RemoteResponse, RemoteTransport};
use crate::errors::{Error, Result};

/// What happened to a request issued through [`OfflineAwareRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// 2xx from the remote API.
    Delivered(RemoteResponse),
    /// The remote API answered with a permanent (non-retryable) rejection.
    /// Nothing was queued; the caller owns the response.
    Rejected(RemoteResponse),
    /// Accepted for later delivery. Callers apply the mutation optimistically
    /// and must not present this as an error.
    Queued(QueuedAction),
}

impl RequestOutcome {
    pub fn response(&self) -> Option<&RemoteResponse> {
        match self {
            RequestOutcome::Delivered(response) | RequestOutcome::Rejected(response) => {
                Some(response)
            }
            RequestOutcome::Queued(_) => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, RequestOutcome::Queued(_))
    }
}

pub struct OfflineAwareRequest {
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<dyn PendingActionQueue>,
    transport: Arc<dyn RemoteTransport>,
    drain_signal: Option<DrainSignal>,
}

impl OfflineAwareRequest {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        queue: Arc<dyn PendingActionQueue>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        Self {
            monitor,
            queue,
            transport,
            drain_signal: None,
        }
    }

    /// Wake the coordinator whenever a request joins a non-empty queue.
    pub fn with_drain_signal(mut self, signal: DrainSignal) -> Self {
        self.drain_signal = Some(signal);
        self
    }

    pub fn queue(&self) -> &Arc<dyn PendingActionQueue> {
        &self.queue
    }

    /// Send `payload` now if possible, otherwise queue it.
    ///
    /// The only error is a failed queue write ([`Error::QueueWrite`]): the
    /// mutation could neither be delivered nor saved for later.
    pub async fn send(&self, kind: &str, payload: ActionPayload) -> Result<RequestOutcome> {
        if !self.monitor.is_online() {
            debug!(
                "[OfflineSync] Offline, queueing {} {} ({})",
                payload.method, payload.target_url, kind
            );
            return self.enqueue(kind, payload).await;
        }

        // Older actions still waiting: sending now would overtake them.
        match self.queue.count() {
            Ok(pending) if pending > 0 => {
                debug!(
                    "[OfflineSync] {} older action(s) pending, queueing {} behind them",
                    pending, kind
                );
                let outcome = self.enqueue(kind, payload).await?;
                if let Some(signal) = &self.drain_signal {
                    signal.notify();
                }
                return Ok(outcome);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "[OfflineSync] Could not read pending count, sending directly: {}",
                    err
                );
            }
        }

        match self.transport.send(&payload).await {
            Ok(response) if response.is_success() => Ok(RequestOutcome::Delivered(response)),
            Ok(response) => match response.retry_class() {
                SyncRetryClass::Permanent => {
                    warn!(
                        "[OfflineSync] {} {} rejected with status {}",
                        payload.method, payload.target_url, response.status
                    );
                    Ok(RequestOutcome::Rejected(response))
                }
                SyncRetryClass::Retryable | SyncRetryClass::ReauthRequired => {
                    debug!(
                        "[OfflineSync] {} {} answered {}, queueing for replay",
                        payload.method, payload.target_url, response.status
                    );
                    self.enqueue(kind, payload).await
                }
            },
            Err(err) => {
                debug!(
                    "[OfflineSync] {} {} failed ({}), queueing for replay",
                    payload.method, payload.target_url, err
                );
                self.enqueue(kind, payload).await
            }
        }
    }

    async fn enqueue(&self, kind: &str, payload: ActionPayload) -> Result<RequestOutcome> {
        match self.queue.enqueue(kind, payload).await {
            Ok(action) => Ok(RequestOutcome::Queued(action)),
            Err(err) => {
                warn!("[OfflineSync] Failed to persist pending action: {}", err);
                Err(Error::QueueWrite(err.to_string()))
            }
        }
    }
}
