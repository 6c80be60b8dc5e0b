//! TTL cache store with single-flight fetch coordination.
//!
//! This crate provides the shared caching layer for the campus data core:
//!
//! - **Store**: per-key TTL expiry, stale-grace serving, and single-flight
//!   coordination so concurrent demand for one key issues one upstream fetch
//! - **Retry**: a bounded exponential backoff policy applied at the fetch
//!   boundary
//! - **Errors**: the upstream error taxonomy shared by every fetch path

mod error;
mod retry;
mod store;

pub use error::UpstreamError;
pub use retry::RetryPolicy;
pub use store::{CacheStore, Cached};
