//! Rate limiting for the lettergate control plane.
//!
//! Two limiter families share the store behind a unified [`RateLimiter`]
//! facade:
//!
//! - **Daily cap + cooldown** -- a per-session budget for the AI endpoint
//!   that resets at local midnight, plus a short mandatory wait between
//!   uses. Checks are read-only; usage is committed once work is accepted.
//!
//! - **Sliding window log** -- one per limiter class (`global` by IP, `ai`
//!   by session, `api` by IP). Each check is a single atomic store step.
//!   Repeated denials escalate into a temporary ban.
//!
//! All state lives in the shared store so replicas agree. Store failures
//! fail open with a warning.

pub mod daily_cap;
pub mod sliding_window;

use std::sync::Arc;

use lettergate_common::{KeySpace, RateLimitConfig, StoreResult};
use lettergate_store::SharedStore;
use serde::{Deserialize, Serialize};

pub use daily_cap::DailyCapLimiter;
pub use sliding_window::SlidingWindowLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    CooldownActive,
    DailyLimitReached,
    RateLimited,
    Banned,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::CooldownActive => "COOLDOWN_ACTIVE",
            DenyReason::DailyLimitReached => "DAILY_LIMIT_REACHED",
            DenyReason::RateLimited => "RATE_LIMITED",
            DenyReason::Banned => "BANNED",
        }
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which the budget is expected to recover.
    pub reset_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// Allowed only because the store could not be reached.
    #[serde(skip)]
    pub degraded: bool,
}

impl RateDecision {
    pub fn allow(limit: u64, remaining: u64, reset_at: i64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after_seconds: None,
            reason: None,
            degraded: false,
        }
    }

    pub fn deny(reason: DenyReason, limit: u64, retry_after: u64, now: i64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: now + retry_after as i64,
            retry_after_seconds: Some(retry_after),
            reason: Some(reason),
            degraded: false,
        }
    }

    pub fn fail_open(limit: u64, reset_at: i64) -> Self {
        Self {
            degraded: true,
            ..Self::allow(limit, limit, reset_at)
        }
    }
}

/// Sliding-window limiter classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterClass {
    /// Every `/api` request, keyed by client IP.
    Global,
    /// The letter generator, keyed by session.
    Ai,
    /// Public read endpoints, keyed by client IP.
    Api,
}

impl LimiterClass {
    pub const ALL: [LimiterClass; 3] = [LimiterClass::Global, LimiterClass::Ai, LimiterClass::Api];

    pub fn as_str(self) -> &'static str {
        match self {
            LimiterClass::Global => "global",
            LimiterClass::Ai => "ai",
            LimiterClass::Api => "api",
        }
    }
}

/// All limiters of the control plane behind one handle.
///
/// Cheaply cloneable and safe to share across tasks.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    global: SlidingWindowLimiter,
    ai: SlidingWindowLimiter,
    api: SlidingWindowLimiter,
    ai_daily: DailyCapLimiter,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, config: &RateLimitConfig) -> Self {
        tracing::info!(
            daily_cap = config.ai_daily.cap,
            cooldown_secs = config.ai_daily.cooldown_secs,
            global_limit = config.global.limit,
            ai_limit = config.ai.limit,
            api_limit = config.api.limit,
            "creating rate limiters"
        );
        let window = |class: LimiterClass, cfg| {
            SlidingWindowLimiter::new(class.as_str(), Arc::clone(&store), keys.clone(), cfg)
        };
        Self {
            inner: Arc::new(RateLimiterInner {
                global: window(LimiterClass::Global, config.global.clone()),
                ai: window(LimiterClass::Ai, config.ai.clone()),
                api: window(LimiterClass::Api, config.api.clone()),
                ai_daily: DailyCapLimiter::new(
                    Arc::clone(&store),
                    keys.clone(),
                    config.ai_daily.clone(),
                ),
            }),
        }
    }

    pub fn window(&self, class: LimiterClass) -> &SlidingWindowLimiter {
        match class {
            LimiterClass::Global => &self.inner.global,
            LimiterClass::Ai => &self.inner.ai,
            LimiterClass::Api => &self.inner.api,
        }
    }

    pub fn ai_daily(&self) -> &DailyCapLimiter {
        &self.inner.ai_daily
    }

    /// Sliding-window check for one class.
    pub async fn check(&self, class: LimiterClass, identifier: &str) -> RateDecision {
        self.window(class).check(identifier).await
    }

    /// Full pre-check for a letter request: the `ai` window, then the daily
    /// cap and cooldown.
    pub async fn check_ai(&self, session: &str) -> RateDecision {
        let window = self.inner.ai.check(session).await;
        if !window.allowed {
            return window;
        }
        self.inner.ai_daily.check(session).await
    }

    /// Record a letter request that was actually accepted.
    pub async fn commit_ai(&self, session: &str) -> StoreResult<u64> {
        self.inner.ai_daily.commit(session).await
    }

    /// Clear every class window, violation counter and ban plus the daily
    /// counter and cooldown for `identifier`. Returns the number of keys
    /// removed.
    pub async fn reset_all(&self, identifier: &str) -> StoreResult<u64> {
        let mut removed = 0;
        for class in LimiterClass::ALL {
            removed += self.window(class).reset(identifier).await?;
        }
        removed += self.inner.ai_daily.reset(identifier).await?;
        tracing::info!(identifier, removed, "rate limit state reset");
        Ok(removed)
    }
}
