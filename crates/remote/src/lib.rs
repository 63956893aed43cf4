//! HTTP side of the offline sync engine: the contract API client used as the
//! engine's transport, and a reachability probe feeding the connectivity
//! monitor.

pub mod client;
pub mod error;
pub mod probe;

pub use client::ContractApiClient;
pub use error::{RemoteError, Result};
pub use probe::ReachabilityProbe;
