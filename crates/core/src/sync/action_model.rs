//! Pending-action domain models and engine status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action kind for block content saves issued by a live contract session.
pub const ACTION_KIND_UPDATE_BLOCKS: &str = "updateBlocks";

/// Action kind for discrete contract status changes.
pub const ACTION_KIND_UPDATE_STATUS: &str = "updateStatus";

/// HTTP verbs an action may replay with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to reconstruct a request later. The body is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    pub target_url: String,
    pub method: HttpMethod,
    pub body: Option<serde_json::Value>,
}

impl ActionPayload {
    pub fn new(
        method: HttpMethod,
        target_url: impl Into<String>,
        body: Option<serde_json::Value>,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            method,
            body,
        }
    }

    pub fn get(target_url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target_url, None)
    }

    pub fn patch(target_url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Patch, target_url, Some(body))
    }

    pub fn post(target_url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, target_url, Some(body))
    }
}

/// One entry of the durable FIFO log.
///
/// `id` is assigned by the queue and strictly increases with enqueue order;
/// the bookkeeping fields never influence ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: i64,
    pub kind: String,
    pub payload: ActionPayload,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Drain state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainState {
    Idle,
    Draining,
}

/// What caused a drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainTrigger {
    Startup,
    Reconnect,
    LocalMutation,
    Retry,
    Manual,
}

/// Result of one drain cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum DrainOutcome {
    /// Queue emptied (or was already empty).
    Completed { replayed: usize },
    /// Stopped at `action_id`; it and everything after it are still queued.
    /// `action_id` is `None` when the queue itself could not be read.
    Halted {
        replayed: usize,
        action_id: Option<i64>,
        reason: String,
    },
    /// Another drain loop holds the lock; nothing was attempted.
    AlreadyDraining,
    /// Connectivity monitor reports offline; nothing was attempted.
    Offline,
}

impl DrainOutcome {
    pub fn replayed(&self) -> usize {
        match self {
            DrainOutcome::Completed { replayed } | DrainOutcome::Halted { replayed, .. } => {
                *replayed
            }
            DrainOutcome::AlreadyDraining | DrainOutcome::Offline => 0,
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, DrainOutcome::Halted { .. })
    }

    pub fn status_code(&self) -> &'static str {
        match self {
            DrainOutcome::Completed { .. } => "ok",
            DrainOutcome::Halted { .. } => "halted",
            DrainOutcome::AlreadyDraining => "already_draining",
            DrainOutcome::Offline => "offline",
        }
    }
}

/// Lightweight engine status surfaced to the UI ("N pending").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: DrainState,
    pub pending_count: i64,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: DrainState::Idle,
            pending_count: 0,
            last_drain_at: None,
            last_outcome: None,
            last_error: None,
            consecutive_failures: 0,
            next_retry_at: None,
        }
    }
}
