//! SQLite-backed contract record cache.

mod model;
mod repository;

pub use model::ContractRecordDB;
pub use repository::ContractRecordRepository;
