use std::sync::Arc;
use std::time::Duration;

use lettergate_common::time::{now_secs, seconds_until_local_midnight};
use lettergate_common::{DailyCapConfig, KeySpace, StoreError, StoreResult};
use lettergate_store::SharedStore;

use crate::{DenyReason, RateDecision};

/// Per-session daily budget with a cooldown between uses.
///
/// `check` only reads; the counter and cooldown are written by `commit`
/// once the guarded work has actually been accepted.
pub struct DailyCapLimiter {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    config: DailyCapConfig,
}

impl DailyCapLimiter {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, config: DailyCapConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    pub fn cap(&self) -> u64 {
        self.config.cap
    }

    async fn used_today(&self, session: &str) -> StoreResult<u64> {
        let key = self.keys.ai_daily(session);
        match self.store.get(&key).await? {
            Some(raw) => raw.parse::<u64>().map_err(|e| StoreError::Corrupt {
                key,
                message: format!("daily counter is not an integer: {}", e),
            }),
            None => Ok(0),
        }
    }

    pub async fn check(&self, session: &str) -> RateDecision {
        match self.try_check(session).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(session, error = %e, "daily cap store unavailable, failing open");
                RateDecision::fail_open(
                    self.config.cap,
                    now_secs() + seconds_until_local_midnight() as i64,
                )
            }
        }
    }

    async fn try_check(&self, session: &str) -> StoreResult<RateDecision> {
        let now = now_secs();
        let until_midnight = seconds_until_local_midnight();

        let cooldown_key = self.keys.ai_cooldown(session);
        if self.store.exists(&cooldown_key).await? {
            let retry_after = self
                .store
                .ttl(&cooldown_key)
                .await?
                .map(|ttl| ttl.as_secs().max(1))
                .unwrap_or(self.config.cooldown_secs);
            let used = self.used_today(session).await?;
            let mut decision =
                RateDecision::deny(DenyReason::CooldownActive, self.config.cap, retry_after, now);
            decision.remaining = self.config.cap.saturating_sub(used);
            return Ok(decision);
        }

        let used = self.used_today(session).await?;
        if used >= self.config.cap {
            return Ok(RateDecision::deny(
                DenyReason::DailyLimitReached,
                self.config.cap,
                until_midnight,
                now,
            ));
        }

        Ok(RateDecision::allow(
            self.config.cap,
            self.config.cap - used,
            now + until_midnight as i64,
        ))
    }

    /// Count one use and start the cooldown. Returns today's count.
    pub async fn commit(&self, session: &str) -> StoreResult<u64> {
        let count = self
            .store
            .incr_with_expiry(
                &self.keys.ai_daily(session),
                Duration::from_secs(seconds_until_local_midnight()),
            )
            .await?;
        self.store
            .set(
                &self.keys.ai_cooldown(session),
                "1",
                Some(Duration::from_secs(self.config.cooldown_secs)),
            )
            .await?;
        tracing::debug!(session, count, "daily usage committed");
        Ok(count.max(0) as u64)
    }

    pub async fn reset(&self, session: &str) -> StoreResult<u64> {
        self.store
            .delete(&[self.keys.ai_daily(session), self.keys.ai_cooldown(session)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FailingStore;
    use lettergate_store::MemoryStore;

    fn limiter(store: Arc<MemoryStore>, cap: u64, cooldown_secs: u64) -> DailyCapLimiter {
        DailyCapLimiter::new(store, KeySpace::default(), DailyCapConfig { cap, cooldown_secs })
    }

    #[tokio::test]
    async fn fresh_session_has_full_budget() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 5, 120);
        let decision = limiter.check("s1").await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.remaining, 5);
        assert!(decision.reset_at > now_secs());
    }

    #[tokio::test]
    async fn check_does_not_consume() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 1, 120);
        for _ in 0..10 {
            assert!(limiter.check("s1").await.allowed);
        }
    }

    #[tokio::test]
    async fn cooldown_blocks_under_cap() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 5, 120);
        limiter.commit("s1").await.unwrap();

        let decision = limiter.check("s1").await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::CooldownActive));
        assert_eq!(decision.remaining, 4);
        let retry = decision.retry_after_seconds.unwrap();
        assert!(retry > 0 && retry <= 120);
    }

    #[tokio::test]
    async fn cap_is_reached_after_exactly_cap_commits() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(Arc::clone(&store), 5, 120);

        for expected in 1..=5 {
            // Clear the cooldown so only the cap is in play.
            store.delete(&["ratelimit:ai:s1:cooldown".to_string()]).await.unwrap();
            assert!(limiter.check("s1").await.allowed, "use {} should be allowed", expected);
            assert_eq!(limiter.commit("s1").await.unwrap(), expected);
        }

        store.delete(&["ratelimit:ai:s1:cooldown".to_string()]).await.unwrap();
        let decision = limiter.check("s1").await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::DailyLimitReached));
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_seconds.unwrap() <= 86_400);
    }

    #[tokio::test]
    async fn daily_counter_expires_at_midnight() {
        let store = Arc::new(MemoryStore::new());
        let limiter = limiter(Arc::clone(&store), 5, 120);
        limiter.commit("s1").await.unwrap();

        let ttl = store.ttl("ratelimit:ai:s1:daily").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn reset_clears_counter_and_cooldown() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 1, 120);
        limiter.commit("s1").await.unwrap();
        assert!(!limiter.check("s1").await.allowed);

        assert_eq!(limiter.reset("s1").await.unwrap(), 2);
        assert!(limiter.check("s1").await.allowed);
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let limiter = DailyCapLimiter::new(
            Arc::new(FailingStore),
            KeySpace::default(),
            DailyCapConfig::default(),
        );
        let decision = limiter.check("s1").await;
        assert!(decision.allowed);
        assert!(decision.degraded);
        assert!(limiter.commit("s1").await.is_err());
    }
}
