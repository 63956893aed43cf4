//! Durable pending-action queue.

mod model;
mod repository;

pub use model::{NewPendingActionDB, PendingActionDB};
pub use repository::PendingActionRepository;
