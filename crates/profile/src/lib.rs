pub mod enrichment;
pub mod referer;
pub mod score;
pub mod user_agent;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use lettergate_common::ProfileConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use enrichment::{is_routable, Enricher, Enrichment, HttpEnricher, IpHasher, NoEnrichment};
use user_agent::{DeviceSummary, HeuristicUaParser, UserAgentParser};

pub use score::classify;

/// Visitor profile categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Recruiter,
    Cto,
    TechLead,
    Ceo,
    Developer,
    Other,
}

impl ProfileType {
    /// Profiles that may skip the visit-count threshold.
    pub fn is_bypass_eligible(self) -> bool {
        matches!(
            self,
            ProfileType::Recruiter | ProfileType::Cto | ProfileType::TechLead | ProfileType::Ceo
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileType::Recruiter => "recruiter",
            ProfileType::Cto => "cto",
            ProfileType::TechLead => "tech_lead",
            ProfileType::Ceo => "ceo",
            ProfileType::Developer => "developer",
            ProfileType::Other => "other",
        }
    }
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of profile classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedProfile {
    pub profile_type: ProfileType,
    /// 0..=100.
    pub confidence: u8,
    /// Contributing sources, strongest first.
    pub sources: Vec<String>,
    pub device: DeviceSummary,
}

impl DetectedProfile {
    pub fn other(device: DeviceSummary) -> Self {
        Self {
            profile_type: ProfileType::Other,
            confidence: 0,
            sources: Vec::new(),
            device,
        }
    }
}

/// Raw User-Agent plus its parsed summary.
#[derive(Debug, Clone)]
pub struct DeviceSignals {
    pub user_agent: String,
    pub summary: DeviceSummary,
}

/// Request attributes the detector looks at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSignals {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub client_ip: Option<IpAddr>,
}

/// Runs the User-Agent parser, the enrichment lookup and the classifier.
pub struct ProfileDetector {
    parser: Arc<dyn UserAgentParser>,
    enricher: Arc<dyn Enricher>,
    hasher: IpHasher,
    enrichment_timeout: Duration,
}

impl ProfileDetector {
    pub fn new(
        parser: Arc<dyn UserAgentParser>,
        enricher: Arc<dyn Enricher>,
        hasher: IpHasher,
        enrichment_timeout: Duration,
    ) -> Self {
        Self {
            parser,
            enricher,
            hasher,
            enrichment_timeout,
        }
    }

    /// Build a detector from configuration. Uses the HTTP enricher when
    /// enrichment is enabled, otherwise no enrichment at all.
    pub fn from_config(config: &ProfileConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.enrichment.timeout_ms);
        let enricher: Arc<dyn Enricher> = match (&config.enrichment.endpoint, config.enrichment.enabled) {
            (Some(endpoint), true) => Arc::new(HttpEnricher::new(
                endpoint.clone(),
                config.enrichment.api_key.clone(),
                timeout,
            )?),
            _ => Arc::new(NoEnrichment),
        };

        Ok(Self::new(
            Arc::new(HeuristicUaParser),
            enricher,
            IpHasher::new(&config.ip_hash_salt),
            timeout,
        ))
    }

    pub fn hasher(&self) -> &IpHasher {
        &self.hasher
    }

    async fn lookup(&self, ip: &IpAddr) -> Option<Enrichment> {
        if !is_routable(ip) {
            return None;
        }
        let hashed = self.hasher.hash(ip);
        match tokio::time::timeout(self.enrichment_timeout, self.enricher.enrich(&hashed)).await {
            Ok(found) => found,
            Err(_) => {
                debug!(timeout_ms = self.enrichment_timeout.as_millis() as u64, "enrichment timed out");
                None
            }
        }
    }

    pub async fn detect(&self, signals: &RequestSignals) -> DetectedProfile {
        let user_agent = signals.user_agent.clone().unwrap_or_default();
        let device = DeviceSignals {
            summary: self.parser.parse(&user_agent),
            user_agent,
        };

        let enrichment = match &signals.client_ip {
            Some(ip) => self.lookup(ip).await,
            None => None,
        };

        let profile = classify(&device, signals.referer.as_deref(), enrichment.as_ref());
        debug!(
            profile = %profile.profile_type,
            confidence = profile.confidence,
            sources = ?profile.sources,
            "profile detected"
        );
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::enrichment::StaticEnricher;

    struct SlowEnricher;

    #[async_trait]
    impl Enricher for SlowEnricher {
        async fn enrich(&self, _hashed_ip: &str) -> Option<Enrichment> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some(Enrichment::from_pairs([("job_title", "CEO")]))
        }
    }

    fn detector_with(enricher: Arc<dyn Enricher>, timeout: Duration) -> ProfileDetector {
        ProfileDetector::new(
            Arc::new(HeuristicUaParser),
            enricher,
            IpHasher::new("test-salt"),
            timeout,
        )
    }

    #[test]
    fn test_bypass_eligibility() {
        assert!(ProfileType::Recruiter.is_bypass_eligible());
        assert!(ProfileType::TechLead.is_bypass_eligible());
        assert!(!ProfileType::Developer.is_bypass_eligible());
        assert!(!ProfileType::Other.is_bypass_eligible());
    }

    #[test]
    fn test_profile_type_serde() {
        assert_eq!(serde_json::to_string(&ProfileType::TechLead).unwrap(), "\"tech_lead\"");
        let parsed: ProfileType = serde_json::from_str("\"cto\"").unwrap();
        assert_eq!(parsed, ProfileType::Cto);
    }

    #[tokio::test]
    async fn test_detect_uses_hashed_ip_enrichment() {
        let ip: IpAddr = "198.51.100.20".parse().unwrap();
        let hashed = IpHasher::new("test-salt").hash(&ip);
        let enricher = StaticEnricher::new()
            .with_entry(hashed, Enrichment::from_pairs([("job_title", "Head of Talent")]));
        let detector = detector_with(Arc::new(enricher), Duration::from_millis(500));

        let profile = detector
            .detect(&RequestSignals {
                user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0".into()),
                referer: Some("https://www.linkedin.com/in/someone".into()),
                client_ip: Some(ip),
            })
            .await;

        // 20*0.3 + 60*0.2 + 100*0.5 = 68
        assert_eq!(profile.profile_type, ProfileType::Recruiter);
        assert_eq!(profile.confidence, 68);
        assert_eq!(profile.device.browser, "Firefox");
    }

    #[tokio::test]
    async fn test_private_ip_skips_enrichment() {
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        let hashed = IpHasher::new("test-salt").hash(&ip);
        let enricher =
            StaticEnricher::new().with_entry(hashed, Enrichment::from_pairs([("job_title", "CEO")]));
        let detector = detector_with(Arc::new(enricher), Duration::from_millis(500));

        let profile = detector
            .detect(&RequestSignals {
                client_ip: Some(ip),
                ..Default::default()
            })
            .await;
        assert_eq!(profile.profile_type, ProfileType::Other);
        assert_eq!(profile.confidence, 0);
    }

    #[tokio::test]
    async fn test_enrichment_timeout_is_no_data() {
        let detector = detector_with(Arc::new(SlowEnricher), Duration::from_millis(20));
        let profile = detector
            .detect(&RequestSignals {
                user_agent: Some("curl/8.4.0".into()),
                referer: None,
                client_ip: Some("203.0.113.9".parse().unwrap()),
            })
            .await;
        assert_eq!(profile.profile_type, ProfileType::Developer);
        assert_eq!(profile.confidence, 21);
    }

    #[test]
    fn test_from_config_without_enrichment() {
        let detector = ProfileDetector::from_config(&ProfileConfig::default()).unwrap();
        let ip: IpAddr = "203.0.113.1".parse().unwrap();
        assert_eq!(detector.hasher().hash(&ip), IpHasher::new("lettergate").hash(&ip));
    }
}
