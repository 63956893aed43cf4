//! SQLite persistence for the offline sync engine: contract record cache and
//! the durable pending-action queue.

pub mod contracts;
pub mod db;
pub mod errors;
pub mod schema;
pub mod sync;

pub use contracts::ContractRecordRepository;
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use sync::PendingActionRepository;
