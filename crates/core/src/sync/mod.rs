//! Offline sync engine: pending-action queue, connectivity, replay.

mod action_model;
mod connectivity;
mod coordinator;
mod offline_request;
mod pending_queue;
mod retry_policy;
mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use action_model::*;
pub use connectivity::*;
pub use coordinator::*;
pub use offline_request::*;
pub use pending_queue::*;
pub use retry_policy::*;
pub use transport::*;
