//! Injectable network reachability state.
//!
//! The monitor is the only mutable connectivity state in the engine. It is
//! owned by whoever wires the engine together and handed to the coordinator,
//! the request chokepoint and the record cache, so tests can drive
//! transitions deterministically.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// A change in reachability. Emitted once per actual transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityTransition {
    Online,
    Offline,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    transitions: broadcast::Sender<ConnectivityTransition>,
}

impl ConnectivityMonitor {
    /// Create a monitor from the platform's initial reachability signal.
    ///
    /// `None` means the signal is unavailable; the monitor then assumes online,
    /// since failed network calls are still caught downstream.
    pub fn new(initial: Option<bool>) -> Self {
        let online = initial.unwrap_or(true);
        let (state, _) = watch::channel(online);
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self { state, transitions }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Feed a platform "became reachable/unreachable" signal.
    ///
    /// Returns `true` when the signal changed the state. Repeated identical
    /// signals are ignored and notify nobody.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });

        if !changed {
            debug!(
                "[OfflineSync] Ignoring repeated connectivity signal (online={})",
                reachable
            );
            return false;
        }

        let transition = if reachable {
            ConnectivityTransition::Online
        } else {
            ConnectivityTransition::Offline
        };
        info!("[OfflineSync] Connectivity transition: {:?}", transition);
        // No receivers is fine; the state itself is already updated.
        let _ = self.transitions.send(transition);
        true
    }

    /// Subscribe to transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityTransition> {
        self.transitions.subscribe()
    }

    /// Watch the current state (latest value only, no event history).
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn defaults_to_online_without_platform_signal() {
        assert!(ConnectivityMonitor::new(None).is_online());
        assert!(!ConnectivityMonitor::new(Some(false)).is_online());
    }

    #[test]
    fn notifies_exactly_once_per_transition() {
        let monitor = ConnectivityMonitor::new(Some(true));
        let mut events = monitor.subscribe();

        assert!(monitor.set_reachable(false));
        assert!(!monitor.set_reachable(false));
        assert!(!monitor.set_reachable(false));
        assert!(monitor.set_reachable(true));
        assert!(!monitor.set_reachable(true));

        assert_eq!(events.try_recv(), Ok(ConnectivityTransition::Offline));
        assert_eq!(events.try_recv(), Ok(ConnectivityTransition::Online));
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn watch_receivers_observe_latest_state() {
        let monitor = ConnectivityMonitor::new(Some(false));
        let mut rx = monitor.watch();
        assert!(!*rx.borrow());

        monitor.set_reachable(true);
        rx.changed().await.expect("state change");
        assert!(*rx.borrow_and_update());
    }
}
