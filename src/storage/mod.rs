//! Storage implementations for different backends

#[cfg(feature = "rest")]
pub mod rest;
#[cfg(feature = "sqlite")]
pub mod sql;

#[cfg(feature = "rest")]
pub use rest::{Credentials, DEFAULT_TIMEOUT, RestStore};
#[cfg(feature = "sqlite")]
pub use sql::SqlStore;
