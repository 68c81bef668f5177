//! Shared store abstraction for the lettergate control plane.
//!
//! Every piece of cross-request state (visit counters, bypass flags, rate
//! limit windows, the letter queue and job records) lives behind the
//! [`SharedStore`] trait so the control plane stays horizontally replicable.
//! Two backends are provided:
//!
//! - [`MemoryStore`] -- a single-process store on [`DashMap`](dashmap::DashMap)
//!   with per-key TTLs. Used for development and in tests.
//!
//! - [`RedisStore`] -- the production backend. Sliding-window updates run as
//!   a Lua script so evict/count/insert/expire is one atomic step, and every
//!   command is bounded by a short operation timeout.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettergate_common::{StoreBackend, StoreConfig, StoreResult};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Parameters of one atomic sliding-window step.
#[derive(Debug, Clone)]
pub struct WindowHit {
    /// Score of the new entry, in milliseconds since the epoch.
    pub now_ms: i64,
    /// Length of the trailing window.
    pub window: Duration,
    /// The entry is only inserted while the in-window count is below this.
    pub limit: u64,
    /// TTL applied to the whole set after the step.
    pub ttl: Duration,
    /// Unique member name for the new entry.
    pub member: String,
}

/// Key/value, counter, sorted-set and list primitives the control plane
/// needs from its shared store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining time to live. `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Atomically increment an integer counter, creating it at zero.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Set a TTL on an existing key. Returns `false` if the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Evict entries older than the window, count the rest, insert the new
    /// entry when the count is below the limit, refresh the TTL. Returns the
    /// count observed before insertion.
    async fn window_hit(&self, key: &str, hit: WindowHit) -> StoreResult<u64>;

    /// Append to the tail of a list, returning the new length.
    async fn push_back(&self, list: &str, value: &str) -> StoreResult<u64>;

    /// Pop from the head of a list, waiting up to `timeout` for an element.
    async fn pop_front(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>>;

    async fn list_len(&self, list: &str) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;

    /// Increment a counter and give it `ttl` when this increment created it.
    ///
    /// The two steps are not atomic; a crash in between leaves a counter with
    /// no expiry until the next first increment.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let value = self.incr(key).await?;
        if value == 1 {
            self.expire(key, ttl).await?;
        }
        Ok(value)
    }
}

/// Build the configured store backend.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory store");
            let store = Arc::new(MemoryStore::new());
            store.start_cleanup_task(Duration::from_secs(60));
            Ok(store)
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.url, config.op_timeout()).await?;
            tracing::info!(url = %config.url, "connected to redis store");
            Ok(Arc::new(store))
        }
    }
}
