use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use lettergate_common::{StoreError, StoreResult};
use tokio::sync::Notify;

use crate::{SharedStore, WindowHit};

enum Value {
    Text(String),
    /// (score in ms, member), kept in insertion order which is also score
    /// order because scores are wall-clock timestamps.
    SortedSet(Vec<(i64, String)>),
    List(VecDeque<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "string",
            Value::SortedSet(_) => "zset",
            Value::List(_) => "list",
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`SharedStore`] with per-key expiry.
///
/// Each operation holds the DashMap shard lock for its key for its whole
/// duration, which gives the same per-key atomicity Redis gives a single
/// command or script. Expired keys are dropped lazily on access and in bulk
/// by [`purge_expired`](MemoryStore::purge_expired).
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    pushed: Notify,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            pushed: Notify::new(),
        }
    }

    fn drop_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn wrong_type(key: &str, expected: &str, value: &Value) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            message: format!("expected {}, found {}", expected, value.kind()),
        }
    }

    fn try_pop(&self, list: &str) -> StoreResult<Option<String>> {
        self.drop_if_expired(list);
        let Some(mut entry) = self.entries.get_mut(list) else {
            return Ok(None);
        };
        let popped = match &mut entry.value {
            Value::List(items) => items.pop_front(),
            other => return Err(Self::wrong_type(list, "list", other)),
        };
        let now_empty = matches!(&entry.value, Value::List(items) if items.is_empty());
        drop(entry);
        if now_empty {
            self.entries
                .remove_if(list, |_, e| matches!(&e.value, Value::List(items) if items.is_empty()));
        }
        Ok(popped)
    }

    /// Remove every expired key.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_key, entry| !entry.is_expired(now));

        tracing::debug!(remaining = self.entries.len(), "memory store purge complete");
    }

    /// Spawn a background Tokio task that periodically purges expired keys.
    ///
    /// The task holds an `Arc` to the store and runs until the runtime shuts
    /// down.
    pub fn start_cleanup_task(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.purge_expired();
                tracing::trace!("memory store cleanup tick completed");
            }
        })
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.drop_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                other => Err(Self::wrong_type(key, "string", other)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: Value::Text(value.to_string()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.drop_if_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.drop_if_expired(key);
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.drop_if_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Text("0".to_string())));

        let next = match &entry.value {
            Value::Text(text) => text.parse::<i64>().map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: format!("not an integer: {}", e),
            })? + 1,
            other => return Err(Self::wrong_type(key, "string", other)),
        };
        entry.value = Value::Text(next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.drop_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn window_hit(&self, key: &str, hit: WindowHit) -> StoreResult<u64> {
        self.drop_if_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::SortedSet(Vec::new())));

        let cutoff = hit.now_ms - hit.window.as_millis() as i64;
        let count = match &mut entry.value {
            Value::SortedSet(members) => {
                members.retain(|(score, _)| *score > cutoff);
                let count = members.len() as u64;
                if count < hit.limit {
                    members.push((hit.now_ms, hit.member));
                }
                count
            }
            other => return Err(Self::wrong_type(key, "zset", other)),
        };
        entry.expires_at = Some(Instant::now() + hit.ttl);
        Ok(count)
    }

    async fn push_back(&self, list: &str, value: &str) -> StoreResult<u64> {
        self.drop_if_expired(list);
        let len = {
            let mut entry = self
                .entries
                .entry(list.to_string())
                .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
            match &mut entry.value {
                Value::List(items) => {
                    items.push_back(value.to_string());
                    items.len() as u64
                }
                other => return Err(Self::wrong_type(list, "list", other)),
            }
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn pop_front(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before looking so a push between the check
            // and the wait is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(list)? {
                return Ok(Some(value));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn list_len(&self, list: &str) -> StoreResult<u64> {
        self.drop_if_expired(list);
        match self.entries.get(list) {
            Some(entry) => match &entry.value {
                Value::List(items) => Ok(items.len() as u64),
                other => Err(Self::wrong_type(list, "list", other)),
            },
            None => Ok(0),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(now_ms: i64, limit: u64, member: &str) -> WindowHit {
        WindowHit {
            now_ms,
            window: Duration::from_secs(10),
            limit,
            ttl: Duration::from_secs(11),
            member: member.to_string(),
        }
    }

    #[tokio::test]
    async fn set_get_and_expire() {
        let store = MemoryStore::new();
        store
            .set("flag", "1", Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(store.get("flag").await.unwrap().as_deref(), Some("1"));
        assert!(store.ttl("flag").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("flag").await.unwrap(), None);
        assert!(!store.exists("flag").await.unwrap());
    }

    #[tokio::test]
    async fn incr_with_expiry_only_sets_ttl_once() {
        let store = MemoryStore::new();
        assert_eq!(
            store
                .incr_with_expiry("c", Duration::from_secs(100))
                .await
                .unwrap(),
            1
        );
        store.expire("c", Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            store
                .incr_with_expiry("c", Duration::from_secs(100))
                .await
                .unwrap(),
            2
        );
        let ttl = store.ttl("c").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn incr_on_list_is_corrupt() {
        let store = MemoryStore::new();
        store.push_back("q", "a").await.unwrap();
        assert!(matches!(
            store.incr("q").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn window_hit_stops_inserting_at_limit() {
        let store = MemoryStore::new();
        assert_eq!(store.window_hit("w", hit(1_000, 2, "a")).await.unwrap(), 0);
        assert_eq!(store.window_hit("w", hit(1_001, 2, "b")).await.unwrap(), 1);
        assert_eq!(store.window_hit("w", hit(1_002, 2, "c")).await.unwrap(), 2);
        assert_eq!(store.window_hit("w", hit(1_003, 2, "d")).await.unwrap(), 2);

        // 10s later the first two entries have left the window.
        assert_eq!(store.window_hit("w", hit(11_001, 2, "e")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_counts_existing_keys() {
        let store = MemoryStore::new();
        store.set("a", "1", None).await.unwrap();
        store.incr("b").await.unwrap();
        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.delete(&["a".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_fifo() {
        let store = MemoryStore::new();
        store.push_back("q", "1").await.unwrap();
        store.push_back("q", "2").await.unwrap();
        assert_eq!(store.list_len("q").await.unwrap(), 2);

        let timeout = Duration::from_millis(10);
        assert_eq!(store.pop_front("q", timeout).await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.pop_front("q", timeout).await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.pop_front("q", timeout).await.unwrap(), None);
        assert_eq!(store.list_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pop_front_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.pop_front("q", Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push_back("q", "job-1").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("job-1"));
    }

    #[tokio::test]
    async fn purge_removes_expired_entries() {
        let store = MemoryStore::new();
        store.set("keep", "1", None).await.unwrap();
        store
            .set("stale", "1", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        store.purge_expired();

        assert!(store.entries.contains_key("keep"));
        assert!(!store.entries.contains_key("stale"));
    }
}
