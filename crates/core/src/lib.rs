pub mod config;
pub mod contracts;
pub mod errors;
pub mod memory;
pub mod sync;

pub use errors::{Error, Result};
