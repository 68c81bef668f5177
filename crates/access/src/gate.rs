use std::sync::Arc;
use std::time::Duration;

use lettergate_common::{AccessConfig, KeySpace, StoreResult};
use lettergate_profile::{DetectedProfile, ProfileDetector, RequestSignals};
use lettergate_store::SharedStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ledger::{Visitor, VisitorLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    ProfileBypass,
    VisitsThreshold,
    InsufficientVisits,
    NoSession,
}

impl AccessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessReason::ProfileBypass => "profile_bypass",
            AccessReason::VisitsThreshold => "visits_threshold",
            AccessReason::InsufficientVisits => "insufficient_visits",
            AccessReason::NoSession => "no_session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: AccessReason,
    /// Visits still needed; zero when granted.
    pub visits_remaining: u64,
}

impl AccessDecision {
    fn grant(reason: AccessReason) -> Self {
        Self {
            granted: true,
            reason,
            visits_remaining: 0,
        }
    }

    fn deny(reason: AccessReason, visits_remaining: u64) -> Self {
        Self {
            granted: false,
            reason,
            visits_remaining,
        }
    }
}

/// What [`AccessGate::observe`] learned about a request.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub visitor: Visitor,
    pub profile: DetectedProfile,
    /// The profile came from the per-session cache.
    pub cached: bool,
    /// A bypass flag was written by this call.
    pub promoted: bool,
}

/// Decides who may use the letter generator.
pub struct AccessGate {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    ledger: VisitorLedger,
    detector: Arc<ProfileDetector>,
    config: AccessConfig,
}

impl AccessGate {
    pub fn new(
        store: Arc<dyn SharedStore>,
        keys: KeySpace,
        detector: Arc<ProfileDetector>,
        config: AccessConfig,
    ) -> Self {
        let ledger = VisitorLedger::new(Arc::clone(&store), keys.clone());
        Self {
            store,
            keys,
            ledger,
            detector,
            config,
        }
    }

    pub fn ledger(&self) -> &VisitorLedger {
        &self.ledger
    }

    /// Grant or deny access for a session.
    ///
    /// A live bypass flag wins over everything; then a bypass-eligible
    /// stored profile; then the visit threshold.
    pub async fn evaluate(&self, session: Option<&str>) -> StoreResult<AccessDecision> {
        let Some(session) = session.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(AccessDecision::deny(AccessReason::NoSession, self.config.min_visits));
        };

        if self.store.exists(&self.keys.access_bypass(session)).await? {
            return Ok(AccessDecision::grant(AccessReason::ProfileBypass));
        }

        let Some(visitor) = self.ledger.get(session).await? else {
            return Ok(AccessDecision::deny(
                AccessReason::InsufficientVisits,
                self.config.min_visits,
            ));
        };

        if visitor.profile_type.is_some_and(|p| p.is_bypass_eligible()) {
            return Ok(AccessDecision::grant(AccessReason::ProfileBypass));
        }

        if visitor.visit_count >= self.config.min_visits {
            return Ok(AccessDecision::grant(AccessReason::VisitsThreshold));
        }

        Ok(AccessDecision::deny(
            AccessReason::InsufficientVisits,
            self.config.min_visits - visitor.visit_count,
        ))
    }

    /// Store a bypass flag when the profile is eligible and confident
    /// enough. Returns whether a flag was written.
    pub async fn promote(&self, session: &str, profile: &DetectedProfile) -> StoreResult<bool> {
        if !profile.profile_type.is_bypass_eligible()
            || profile.confidence < self.config.bypass_min_confidence
        {
            return Ok(false);
        }

        self.store
            .set(
                &self.keys.access_bypass(session),
                "1",
                Some(Duration::from_secs(self.config.bypass_ttl_secs)),
            )
            .await?;

        info!(
            session,
            profile = %profile.profile_type,
            confidence = profile.confidence,
            "profile bypass granted"
        );
        Ok(true)
    }

    async fn cached_profile(&self, session: &str) -> Option<DetectedProfile> {
        let key = self.keys.profile_cache(session);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(session, error = %e, "discarding unreadable profile cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(session, error = %e, "profile cache lookup failed");
                None
            }
        }
    }

    async fn cache_profile(&self, session: &str, profile: &DetectedProfile) {
        let body = match serde_json::to_string(profile) {
            Ok(body) => body,
            Err(e) => {
                warn!(session, error = %e, "failed to encode profile for cache");
                return;
            }
        };
        let ttl = Duration::from_secs(self.config.profile_cache_ttl_secs);
        if let Err(e) = self
            .store
            .set(&self.keys.profile_cache(session), &body, Some(ttl))
            .await
        {
            warn!(session, error = %e, "failed to cache profile");
        }
    }

    /// Tracking entry point: count the visit, classify (or reuse the cached
    /// classification), remember the profile and promote when eligible.
    ///
    /// Only the visit write is surfaced; caching, profile recording and
    /// promotion are best-effort.
    pub async fn observe(
        &self,
        session: &str,
        new_session: bool,
        signals: &RequestSignals,
    ) -> StoreResult<Observation> {
        let mut visitor = self.ledger.record_visit(session, new_session).await?;

        let (profile, cached) = match self.cached_profile(session).await {
            Some(profile) => (profile, true),
            None => {
                let profile = self.detector.detect(signals).await;
                self.cache_profile(session, &profile).await;
                (profile, false)
            }
        };

        match self.ledger.record_profile(session, &profile).await {
            Ok(()) => {
                visitor.profile_type = Some(profile.profile_type);
                visitor.confidence = profile.confidence;
            }
            Err(e) => warn!(session, error = %e, "failed to record visitor profile"),
        }

        let promoted = match self.promote(session, &profile).await {
            Ok(promoted) => promoted,
            Err(e) => {
                warn!(session, error = %e, "failed to store bypass flag");
                false
            }
        };

        debug!(
            session,
            visit_count = visitor.visit_count,
            profile = %profile.profile_type,
            cached,
            promoted,
            "visitor observed"
        );

        Ok(Observation {
            visitor,
            profile,
            cached,
            promoted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettergate_profile::enrichment::{Enrichment, IpHasher, StaticEnricher};
    use lettergate_profile::user_agent::{DeviceSummary, HeuristicUaParser};
    use lettergate_profile::ProfileType;
    use lettergate_store::MemoryStore;
    use std::net::IpAddr;

    const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn gate_with(store: Arc<MemoryStore>, enricher: StaticEnricher) -> AccessGate {
        let detector = ProfileDetector::new(
            Arc::new(HeuristicUaParser),
            Arc::new(enricher),
            IpHasher::new("salt"),
            Duration::from_millis(200),
        );
        AccessGate::new(
            store,
            KeySpace::default(),
            Arc::new(detector),
            AccessConfig::default(),
        )
    }

    fn gate() -> AccessGate {
        gate_with(Arc::new(MemoryStore::new()), StaticEnricher::new())
    }

    fn browser() -> RequestSignals {
        RequestSignals {
            user_agent: Some(CHROME.to_string()),
            ..Default::default()
        }
    }

    fn profile(profile_type: ProfileType, confidence: u8) -> DetectedProfile {
        DetectedProfile {
            profile_type,
            confidence,
            sources: vec!["ip_enrichment:job_title".to_string()],
            device: DeviceSummary::unknown(),
        }
    }

    #[tokio::test]
    async fn missing_session_is_denied() {
        let gate = gate();
        let decision = gate.evaluate(None).await.unwrap();
        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::NoSession);

        let decision = gate.evaluate(Some("  ")).await.unwrap();
        assert_eq!(decision.reason, AccessReason::NoSession);
    }

    #[tokio::test]
    async fn unknown_visitor_needs_all_visits() {
        let decision = gate().evaluate(Some("fresh")).await.unwrap();
        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::InsufficientVisits);
        assert_eq!(decision.visits_remaining, 3);
    }

    #[tokio::test]
    async fn visit_threshold() {
        let gate = gate();
        for expected_remaining in [2, 1] {
            gate.observe("s1", true, &browser()).await.unwrap();
            let decision = gate.evaluate(Some("s1")).await.unwrap();
            assert!(!decision.granted);
            assert_eq!(decision.visits_remaining, expected_remaining);
        }

        gate.observe("s1", true, &browser()).await.unwrap();
        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, AccessReason::VisitsThreshold);
        assert_eq!(decision.visits_remaining, 0);
    }

    #[tokio::test]
    async fn repeat_requests_in_one_session_do_not_count() {
        let gate = gate();
        gate.observe("s1", true, &browser()).await.unwrap();
        for _ in 0..5 {
            gate.observe("s1", false, &browser()).await.unwrap();
        }
        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert_eq!(decision.visits_remaining, 2);
    }

    #[tokio::test]
    async fn promote_requires_eligible_and_confident_profile() {
        let gate = gate();
        assert!(!gate.promote("s1", &profile(ProfileType::Developer, 95)).await.unwrap());
        assert!(!gate.promote("s1", &profile(ProfileType::Cto, 59)).await.unwrap());
        assert!(!gate.evaluate(Some("s1")).await.unwrap().granted);

        assert!(gate.promote("s1", &profile(ProfileType::Cto, 60)).await.unwrap());
        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, AccessReason::ProfileBypass);
    }

    #[tokio::test]
    async fn bypass_flag_outlives_profile_changes() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), StaticEnricher::new());
        gate.promote("s1", &profile(ProfileType::Recruiter, 80)).await.unwrap();
        gate.ledger()
            .record_profile("s1", &profile(ProfileType::Developer, 30))
            .await
            .unwrap();

        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert_eq!(decision.reason, AccessReason::ProfileBypass);
        assert!(store.ttl("access:bypass:s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn eligible_stored_profile_grants_below_confidence() {
        let gate = gate();
        gate.observe("s1", true, &browser()).await.unwrap();
        gate.ledger()
            .record_profile("s1", &profile(ProfileType::TechLead, 40))
            .await
            .unwrap();

        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, AccessReason::ProfileBypass);
    }

    #[tokio::test]
    async fn observe_promotes_high_value_visitor_on_first_visit() {
        let ip: IpAddr = "203.0.113.50".parse().unwrap();
        let enricher = StaticEnricher::new().with_entry(
            IpHasher::new("salt").hash(&ip),
            Enrichment::from_pairs([("job_title", "Chief Technology Officer")]),
        );
        let gate = gate_with(Arc::new(MemoryStore::new()), enricher);

        let observation = gate
            .observe(
                "s1",
                true,
                &RequestSignals {
                    user_agent: Some(CHROME.to_string()),
                    referer: Some("https://www.linkedin.com/jobs/view/42".to_string()),
                    client_ip: Some(ip),
                },
            )
            .await
            .unwrap();

        assert_eq!(observation.profile.profile_type, ProfileType::Cto);
        assert_eq!(observation.profile.confidence, 76);
        assert!(observation.promoted);
        assert!(!observation.cached);
        assert_eq!(observation.visitor.visit_count, 1);

        let decision = gate.evaluate(Some("s1")).await.unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, AccessReason::ProfileBypass);
    }

    #[tokio::test]
    async fn observe_reuses_cached_profile() {
        let gate = gate();
        let first = gate.observe("s1", true, &browser()).await.unwrap();
        let second = gate
            .observe(
                "s1",
                false,
                &RequestSignals {
                    user_agent: Some("curl/8.4.0".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(second.cached);
        assert_eq!(second.profile, first.profile);
    }
}
