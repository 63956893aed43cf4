//! Contract records: snapshot model, local cache and live editing sessions.

mod contract_model;
mod debounce;
mod live_session;
mod record_cache;
mod record_store;
mod routes;

pub use contract_model::*;
pub use debounce::*;
pub use live_session::*;
pub use record_cache::*;
pub use record_store::*;
pub use routes::*;
