//! Device-local cache of contract snapshots.

use async_trait::async_trait;

use super::contract_model::{CachedRecord, ContractRecordSnapshot};
use crate::errors::Result;

/// Durable per-device key/value store holding the latest known snapshot of
/// each contract.
///
/// Errors are returned to the caller, but the cache is an optimization, not a
/// durability guarantee: [`super::ContractRecordCache`] treats every error as
/// a miss (reads) or ignores it (writes).
#[async_trait]
pub trait LocalRecordStore: Send + Sync {
    /// Atomically replace the cached record for `id`.
    async fn put(&self, id: &str, snapshot: ContractRecordSnapshot) -> Result<CachedRecord>;

    fn get(&self, id: &str) -> Result<Option<CachedRecord>>;

    /// Records whose snapshot has top-level field `key` equal to `value`,
    /// most recently cached first.
    fn list_by_foreign_key(&self, key: &str, value: &str) -> Result<Vec<CachedRecord>>;

    async fn remove(&self, id: &str) -> Result<bool>;
}
