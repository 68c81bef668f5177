use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisResult, Script};
use async_trait::async_trait;
use lettergate_common::{StoreError, StoreResult};

use crate::{SharedStore, WindowHit};

/// Evict, count, conditionally insert and expire in one step.
///
/// KEYS[1] = window set
/// ARGV    = now_ms, window_ms, limit, ttl_ms, member
const WINDOW_HIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count < limit then
  redis.call('ZADD', key, now, ARGV[5])
end
redis.call('PEXPIRE', key, ttl)
return count
"#;

/// [`SharedStore`] backed by Redis.
///
/// Regular commands share one auto-reconnecting [`ConnectionManager`].
/// Blocking pops open a dedicated connection so a waiting worker never
/// stalls other commands multiplexed on the shared one.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    window_script: Script,
    op_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("redis client: {}", e)))?;
        let manager = match tokio::time::timeout(op_timeout, ConnectionManager::new(client.clone()))
            .await
        {
            Ok(Ok(manager)) => manager,
            Ok(Err(e)) => return Err(StoreError::Unavailable(format!("redis connect: {}", e))),
            Err(_) => {
                return Err(StoreError::Timeout {
                    op: "connect",
                    timeout: op_timeout,
                })
            }
        };

        Ok(Self {
            client,
            manager,
            window_script: Script::new(WINDOW_HIT_SCRIPT),
            op_timeout,
        })
    }

    async fn timed<T, F>(&self, op: &'static str, timeout: Duration, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("redis {}: {}", op, e))),
            Err(_) => Err(StoreError::Timeout { op, timeout }),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.timed("get", self.op_timeout, async {
            ::redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.timed("set", self.op_timeout, async {
            cmd.query_async::<_, ()>(&mut conn).await
        })
        .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        self.timed("exists", self.op_timeout, async {
            ::redis::cmd("EXISTS")
                .arg(key)
                .query_async::<_, bool>(&mut conn)
                .await
        })
        .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let pttl: i64 = self
            .timed("pttl", self.op_timeout, async {
                ::redis::cmd("PTTL")
                    .arg(key)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        // -2: no such key, -1: no expiry.
        Ok((pttl >= 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.manager.clone();
        self.timed("incr", self.op_timeout, async {
            ::redis::cmd("INCR")
                .arg(key)
                .query_async::<_, i64>(&mut conn)
                .await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        self.timed("pexpire", self.op_timeout, async {
            ::redis::cmd("PEXPIRE")
                .arg(key)
                .arg(millis(ttl))
                .query_async::<_, bool>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        self.timed("del", self.op_timeout, async {
            ::redis::cmd("DEL")
                .arg(keys)
                .query_async::<_, u64>(&mut conn)
                .await
        })
        .await
    }

    async fn window_hit(&self, key: &str, hit: WindowHit) -> StoreResult<u64> {
        let mut conn = self.manager.clone();
        self.timed("window_hit", self.op_timeout, async {
            self.window_script
                .key(key)
                .arg(hit.now_ms)
                .arg(millis(hit.window))
                .arg(hit.limit)
                .arg(millis(hit.ttl))
                .arg(&hit.member)
                .invoke_async::<_, u64>(&mut conn)
                .await
        })
        .await
    }

    async fn push_back(&self, list: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.manager.clone();
        self.timed("rpush", self.op_timeout, async {
            ::redis::cmd("RPUSH")
                .arg(list)
                .arg(value)
                .query_async::<_, u64>(&mut conn)
                .await
        })
        .await
    }

    async fn pop_front(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>> {
        // BLPOP takes whole seconds on older servers; zero would block forever.
        let block_secs = timeout.as_secs().max(1);
        let budget = Duration::from_secs(block_secs) + self.op_timeout;

        let popped: Option<(String, String)> = self
            .timed("blpop", budget, async {
                let mut conn = self.client.get_multiplexed_async_connection().await?;
                let popped = ::redis::cmd("BLPOP")
                    .arg(list)
                    .arg(block_secs)
                    .query_async::<_, Option<(String, String)>>(&mut conn)
                    .await?;
                Ok::<_, ::redis::RedisError>(popped)
            })
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn list_len(&self, list: &str) -> StoreResult<u64> {
        let mut conn = self.manager.clone();
        self.timed("llen", self.op_timeout, async {
            ::redis::cmd("LLEN")
                .arg(list)
                .query_async::<_, u64>(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        self.timed("ping", self.op_timeout, async {
            ::redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
        })
        .await
        .map(|_| ())
    }
}
