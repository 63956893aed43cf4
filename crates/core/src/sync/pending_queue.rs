//! Durable FIFO log of mutations waiting for delivery.

use async_trait::async_trait;

use super::action_model::{ActionPayload, QueuedAction};
use crate::errors::Result;

/// Durable, append-only, strictly ordered log of pending actions.
///
/// Implementations must guarantee:
/// - `enqueue` has durably persisted the action when it returns `Ok`.
/// - ids strictly increase with enqueue order and survive restarts, so
///   `peek_oldest` always yields the earliest action still present.
/// - `remove_by_id` is the only way an action leaves the log (apart from the
///   administrative `clear`).
///
/// Reads are synchronous (pool connections); writes are async (single writer).
#[async_trait]
pub trait PendingActionQueue: Send + Sync {
    async fn enqueue(&self, kind: &str, payload: ActionPayload) -> Result<QueuedAction>;

    fn peek_oldest(&self) -> Result<Option<QueuedAction>>;

    /// Returns `false` when no action with `id` was present.
    async fn remove_by_id(&self, id: i64) -> Result<bool>;

    fn count(&self) -> Result<i64>;

    /// Oldest-first listing for "pending changes" views.
    fn list(&self, limit: i64) -> Result<Vec<QueuedAction>>;

    /// True when any queued action, however deep in the log, targets
    /// `url_root` or a sub-resource of it (see [`url_is_under`]).
    fn has_actions_under(&self, url_root: &str) -> Result<bool>;

    /// Bookkeeping after a failed replay attempt. Does not change ordering.
    async fn record_failure(&self, id: i64, error: String) -> Result<()>;

    /// Administrative reset. Returns the number of discarded actions.
    async fn clear(&self) -> Result<usize>;
}

/// True when `target_url` is `root` itself, a path below it or `root` with a
/// query string. `.../c-10` is not under `.../c-1`.
pub fn url_is_under(target_url: &str, root: &str) -> bool {
    target_url
        .strip_prefix(root)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_under_matches_sub_resources_only() {
        let root = "https://api.example.test/api/contracts/c-1";
        assert!(url_is_under(root, root));
        assert!(url_is_under(&format!("{}/status", root), root));
        assert!(url_is_under(&format!("{}?fields=blocks", root), root));
        assert!(!url_is_under(&format!("{}0", root), root));
        assert!(!url_is_under("https://api.example.test/api/contracts", root));
    }
}
