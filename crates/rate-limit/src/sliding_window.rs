use std::sync::Arc;
use std::time::Duration;

use lettergate_common::time::{now_millis, now_secs};
use lettergate_common::{KeySpace, SlidingWindowConfig, StoreResult};
use lettergate_store::{SharedStore, WindowHit};
use rand::Rng;

use crate::{DenyReason, RateDecision};

/// Extra lifetime given to a window key beyond the window itself.
const WINDOW_TTL_BUFFER: Duration = Duration::from_secs(1);

/// A shared-store sliding window log with violation tracking and bans.
///
/// Every accepted request leaves a timestamped entry in a sorted set; the
/// set is trimmed to the trailing window on each check. Denials count as
/// violations, and enough violations within the violation TTL turn into a
/// ban that short-circuits every later check until it expires.
///
/// Unlike a plain evict-count-insert log, a denied check leaves no entry:
/// the set never holds more than `limit` members, and a client that keeps
/// hammering a full window regains capacity as soon as its oldest accepted
/// request ages out. Repeated denials are punished through the ban instead.
pub struct SlidingWindowLimiter {
    class: &'static str,
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    config: SlidingWindowConfig,
}

impl SlidingWindowLimiter {
    pub fn new(
        class: &'static str,
        store: Arc<dyn SharedStore>,
        keys: KeySpace,
        config: SlidingWindowConfig,
    ) -> Self {
        Self {
            class,
            store,
            keys,
            config,
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn limit(&self) -> u64 {
        self.config.limit
    }

    /// Check (and, when allowed, record) a request from `identifier`.
    ///
    /// Store failures allow the request and log a warning.
    pub async fn check(&self, identifier: &str) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::allow(
                self.config.limit,
                self.config.limit,
                now_secs() + self.config.window_secs as i64,
            );
        }

        match self.try_check(identifier).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    class = self.class,
                    identifier,
                    error = %e,
                    "rate limit store unavailable, failing open"
                );
                RateDecision::fail_open(self.config.limit, now_secs() + self.config.window_secs as i64)
            }
        }
    }

    async fn try_check(&self, identifier: &str) -> StoreResult<RateDecision> {
        let now = now_secs();
        let ban_key = self.keys.ban(self.class, identifier);

        if self.store.exists(&ban_key).await? {
            let retry_after = self
                .store
                .ttl(&ban_key)
                .await?
                .map(|ttl| ttl.as_secs().max(1))
                .unwrap_or(self.config.ban_ttl_secs);
            return Ok(RateDecision::deny(
                DenyReason::Banned,
                self.config.limit,
                retry_after,
                now,
            ));
        }

        let window = Duration::from_secs(self.config.window_secs);
        let now_ms = now_millis();
        let hit = WindowHit {
            now_ms,
            window,
            limit: self.config.limit,
            ttl: window + WINDOW_TTL_BUFFER,
            member: format!("{}-{:016x}", now_ms, rand::thread_rng().gen::<u64>()),
        };
        let count = self
            .store
            .window_hit(&self.keys.window(self.class, identifier), hit)
            .await?;

        if count < self.config.limit {
            return Ok(RateDecision::allow(
                self.config.limit,
                self.config.limit - count - 1,
                now + self.config.window_secs as i64,
            ));
        }

        let violations = self
            .store
            .incr_with_expiry(
                &self.keys.violations(self.class, identifier),
                Duration::from_secs(self.config.violation_ttl_secs),
            )
            .await?;

        if violations >= self.config.violation_threshold as i64 {
            self.store
                .set(
                    &ban_key,
                    "1",
                    Some(Duration::from_secs(self.config.ban_ttl_secs)),
                )
                .await?;
            tracing::warn!(
                class = self.class,
                identifier,
                violations,
                ban_secs = self.config.ban_ttl_secs,
                "rate limit ban issued"
            );
            return Ok(RateDecision::deny(
                DenyReason::Banned,
                self.config.limit,
                self.config.ban_ttl_secs,
                now,
            ));
        }

        tracing::debug!(class = self.class, identifier, count, violations, "rate limited");
        Ok(RateDecision::deny(
            DenyReason::RateLimited,
            self.config.limit,
            self.config.window_secs,
            now,
        ))
    }

    /// Forget the window, violations and any ban for `identifier`.
    pub async fn reset(&self, identifier: &str) -> StoreResult<u64> {
        self.store
            .delete(&[
                self.keys.window(self.class, identifier),
                self.keys.violations(self.class, identifier),
                self.keys.ban(self.class, identifier),
            ])
            .await
    }
}
