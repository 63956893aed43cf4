//! SQLite storage for offline sync state.

pub mod pending_actions;

pub use pending_actions::{NewPendingActionDB, PendingActionDB, PendingActionRepository};
