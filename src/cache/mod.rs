//! Generic caching layer for server-backed collections.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Stores payloads per key with a fetch timestamp and TTL freshness check
//! - Collapses concurrent reads of one key onto a single network call
//! - Stops retrying a key after repeated failures (circuit breaker)
//! - Serves the last known value when a network attempt is not allowed

mod keys;
mod layer;
mod result;
mod retry;
mod store;

pub use keys::{CacheKey, ALL_KEY};
pub use layer::CacheLayer;
pub use result::{CacheResult, CacheSource};
pub use retry::{RetryGuard, RetryRecord, MAX_RETRY_ATTEMPTS};
pub use store::{CacheEntry, CacheStore, DEFAULT_TTL};
