use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::ProfileType;

type HmacSha256 = Hmac<Sha256>;

/// Free-form attributes returned by an enrichment provider
/// (`company_type`, `job_title`, `industry`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Enrichment {
    pub attributes: HashMap<String, Value>,
}

impl Enrichment {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn job_title(&self) -> Option<&str> {
        self.attribute("job_title")
    }

    pub fn company_type(&self) -> Option<&str> {
        self.attribute("company_type")
    }

    pub fn industry(&self) -> Option<&str> {
        self.attribute("industry")
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Looks up company/person attributes for a hashed client IP.
///
/// Implementations must never see the raw IP, and must map every failure
/// (timeout, HTTP error, malformed payload) to `None`.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, hashed_ip: &str) -> Option<Enrichment>;
}

/// Enricher that never has data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

#[async_trait]
impl Enricher for NoEnrichment {
    async fn enrich(&self, _hashed_ip: &str) -> Option<Enrichment> {
        None
    }
}

/// In-memory enricher keyed by hashed IP. Used for fixtures and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticEnricher {
    entries: HashMap<String, Enrichment>,
}

impl StaticEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, hashed_ip: impl Into<String>, enrichment: Enrichment) -> Self {
        self.entries.insert(hashed_ip.into(), enrichment);
        self
    }
}

#[async_trait]
impl Enricher for StaticEnricher {
    async fn enrich(&self, hashed_ip: &str) -> Option<Enrichment> {
        self.entries.get(hashed_ip).cloned()
    }
}

/// JSON-over-HTTP enrichment provider.
///
/// `endpoint` must contain a `{hash}` placeholder. A 2xx response carrying a
/// JSON object is the attribute map; anything else is "no data".
pub struct HttpEnricher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEnricher {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        if !endpoint.contains("{hash}") {
            anyhow::bail!("enrichment endpoint must contain a {{hash}} placeholder");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, hashed_ip: &str) -> Option<Enrichment> {
        let url = self.endpoint.replace("{hash}", hashed_ip);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "enrichment lookup failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "enrichment provider returned no data");
            return None;
        }

        match response.json::<Enrichment>().await {
            Ok(enrichment) if !enrichment.is_empty() => Some(enrichment),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "malformed enrichment payload");
                None
            }
        }
    }
}

/// Keyed hash of client IPs. The hex digest is the only form of an IP that
/// leaves the process.
#[derive(Clone)]
pub struct IpHasher {
    salt: Vec<u8>,
}

impl IpHasher {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.as_bytes().to_vec(),
        }
    }

    pub fn hash(&self, ip: &IpAddr) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.salt).expect("HMAC can take key of any size");
        mac.update(ip.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Private, loopback and link-local addresses carry no company signal.
pub fn is_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// Outcome of matching enrichment attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentMatch {
    /// Sub-score in 0..=100.
    pub score: u8,
    pub profile: ProfileType,
    pub label: &'static str,
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn title_profile(title: &str) -> Option<(ProfileType, u8)> {
    let title = title.to_lowercase();
    let tokens = words(&title);
    let has = |phrases: &[&str]| phrases.iter().any(|p| title.contains(*p));
    let has_word = |ws: &[&str]| ws.iter().any(|w| tokens.contains(*w));

    if has_word(&["cto"])
        || has(&[
            "chief technology",
            "chief technical",
            "vp engineering",
            "vp of engineering",
            "vice president of engineering",
        ])
    {
        return Some((ProfileType::Cto, 100));
    }
    if has_word(&["ceo", "founder", "cofounder"])
        || has(&["chief executive", "co-founder", "managing director"])
        || (title.contains("president") && !title.contains("vice president"))
    {
        return Some((ProfileType::Ceo, 100));
    }
    if has(&[
        "tech lead",
        "technical lead",
        "lead developer",
        "lead engineer",
        "engineering manager",
        "head of engineering",
        "staff engineer",
        "principal",
        "architect",
    ]) {
        return Some((ProfileType::TechLead, 90));
    }
    if has_word(&["hr"]) || has(&["recruit", "talent", "sourcer", "sourcing", "human resources"]) {
        return Some((ProfileType::Recruiter, 100));
    }
    if has_word(&["sre", "devops"]) || has(&["developer", "engineer", "programmer"]) {
        return Some((ProfileType::Developer, 60));
    }
    None
}

fn company_is_recruiting(text: &str) -> bool {
    let text = text.to_lowercase();
    ["recruit", "staffing", "talent", "headhunt", "placement"]
        .iter()
        .any(|k| text.contains(k))
}

/// Match enrichment attributes against executive, technical-leadership and
/// recruiting keywords. The declared job title wins over the company
/// category.
pub fn score_enrichment(enrichment: &Enrichment) -> Option<EnrichmentMatch> {
    if let Some((profile, score)) = enrichment.job_title().and_then(title_profile) {
        return Some(EnrichmentMatch {
            score,
            profile,
            label: "job_title",
        });
    }

    let recruiting_company = enrichment.company_type().is_some_and(company_is_recruiting)
        || enrichment.industry().is_some_and(company_is_recruiting);
    if recruiting_company {
        return Some(EnrichmentMatch {
            score: 90,
            profile: ProfileType::Recruiter,
            label: "company_type",
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(t: &str) -> Enrichment {
        Enrichment::from_pairs([("job_title", t)])
    }

    #[test]
    fn test_title_keywords() {
        let m = score_enrichment(&title("CTO & Co-founder")).unwrap();
        assert_eq!(m.profile, ProfileType::Cto);

        let m = score_enrichment(&title("Chief Executive Officer")).unwrap();
        assert_eq!(m.profile, ProfileType::Ceo);

        let m = score_enrichment(&title("Engineering Manager, Payments")).unwrap();
        assert_eq!(m.profile, ProfileType::TechLead);
        assert_eq!(m.score, 90);

        let m = score_enrichment(&title("Senior Technical Recruiter")).unwrap();
        assert_eq!(m.profile, ProfileType::Recruiter);

        let m = score_enrichment(&title("Backend Engineer")).unwrap();
        assert_eq!(m.profile, ProfileType::Developer);
        assert_eq!(m.score, 60);
    }

    #[test]
    fn test_vice_president_is_not_ceo() {
        assert!(score_enrichment(&title("Vice President, Sales")).is_none());
    }

    #[test]
    fn test_word_matching_avoids_substrings() {
        // "director" contains "cto" as a substring.
        assert!(score_enrichment(&title("Art Director")).is_none());
    }

    #[test]
    fn test_company_type_fallback() {
        let e = Enrichment::from_pairs([("company_type", "Staffing & Recruiting")]);
        let m = score_enrichment(&e).unwrap();
        assert_eq!(m.profile, ProfileType::Recruiter);
        assert_eq!(m.label, "company_type");
    }

    #[test]
    fn test_blank_attributes_are_ignored() {
        let e = Enrichment::from_pairs([("job_title", "   "), ("industry", "Retail")]);
        assert!(score_enrichment(&e).is_none());
    }

    #[test]
    fn test_ip_hash_is_stable_and_salted() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let a = IpHasher::new("salt-a");
        let b = IpHasher::new("salt-b");

        assert_eq!(a.hash(&ip), a.hash(&ip));
        assert_ne!(a.hash(&ip), b.hash(&ip));
        assert_eq!(a.hash(&ip).len(), 64);
        assert!(!a.hash(&ip).contains("203.0.113.7"));
    }

    #[test]
    fn test_routable() {
        assert!(is_routable(&"203.0.113.7".parse().unwrap()));
        assert!(!is_routable(&"10.1.2.3".parse().unwrap()));
        assert!(!is_routable(&"127.0.0.1".parse().unwrap()));
        assert!(!is_routable(&"::1".parse().unwrap()));
        assert!(!is_routable(&"fd00::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_static_enricher() {
        let enricher =
            StaticEnricher::new().with_entry("abc", Enrichment::from_pairs([("job_title", "CEO")]));
        assert!(enricher.enrich("abc").await.is_some());
        assert!(enricher.enrich("def").await.is_none());
        assert!(NoEnrichment.enrich("abc").await.is_none());
    }
}
