use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Top-level control-plane configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_true")]
    pub cors: bool,
    /// Peers (addresses or CIDR ranges) whose `X-Forwarded-For` /
    /// `X-Real-IP` headers are believed. Everyone else is identified by
    /// the socket address.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors: true,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Optional namespace prepended to every key (`{prefix}:{key}`).
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_redis_url(),
            key_prefix: None,
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_min_visits")]
    pub min_visits: u64,
    #[serde(default = "default_bypass_min_confidence")]
    pub bypass_min_confidence: u8,
    #[serde(default = "default_bypass_ttl")]
    pub bypass_ttl_secs: u64,
    #[serde(default = "default_profile_cache_ttl")]
    pub profile_cache_ttl_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            min_visits: default_min_visits(),
            bypass_min_confidence: default_bypass_min_confidence(),
            bypass_ttl_secs: default_bypass_ttl(),
            profile_cache_ttl_secs: default_profile_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Secret mixed into the IP hash. Rotating it invalidates enrichment
    /// cache hits on the provider side, nothing else.
    #[serde(default = "default_ip_hash_salt")]
    pub ip_hash_salt: String,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            ip_hash_salt: default_ip_hash_salt(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Lookup URL; `{hash}` is replaced with the hashed IP.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_enrichment_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_ms: default_enrichment_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub ai_daily: DailyCapConfig,
    #[serde(default = "default_global_window")]
    pub global: SlidingWindowConfig,
    #[serde(default = "default_ai_window")]
    pub ai: SlidingWindowConfig,
    #[serde(default = "default_api_window")]
    pub api: SlidingWindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ai_daily: DailyCapConfig::default(),
            global: default_global_window(),
            ai: default_ai_window(),
            api: default_api_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCapConfig {
    #[serde(default = "default_daily_cap")]
    pub cap: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for DailyCapConfig {
    fn default() -> Self {
        Self {
            cap: default_daily_cap(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub limit: u64,
    pub window_secs: u64,
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u64,
    #[serde(default = "default_violation_ttl")]
    pub violation_ttl_secs: u64,
    #[serde(default = "default_ban_ttl")]
    pub ban_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_queue_key")]
    pub queue: String,
    #[serde(default = "default_job_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout_secs: u64,
    #[serde(default = "default_estimated_duration")]
    pub estimated_duration_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue: default_queue_key(),
            ttl_secs: default_job_ttl(),
            max_retries: default_max_retries(),
            dequeue_timeout_secs: default_dequeue_timeout(),
            estimated_duration_secs: default_estimated_duration(),
        }
    }
}

// Default value helpers
fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_true() -> bool {
    true
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_op_timeout_ms() -> u64 {
    2_000
}
fn default_min_visits() -> u64 {
    3
}
fn default_bypass_min_confidence() -> u8 {
    60
}
fn default_bypass_ttl() -> u64 {
    30 * 24 * 3600
}
fn default_profile_cache_ttl() -> u64 {
    24 * 3600
}
fn default_ip_hash_salt() -> String {
    "lettergate".to_string()
}
fn default_enrichment_timeout_ms() -> u64 {
    1_500
}
fn default_daily_cap() -> u64 {
    5
}
fn default_cooldown_secs() -> u64 {
    120
}
fn default_violation_threshold() -> u64 {
    5
}
fn default_violation_ttl() -> u64 {
    3600
}
fn default_ban_ttl() -> u64 {
    3600
}
fn default_global_window() -> SlidingWindowConfig {
    SlidingWindowConfig {
        enabled: true,
        limit: 100,
        window_secs: 60,
        violation_threshold: 10,
        violation_ttl_secs: default_violation_ttl(),
        ban_ttl_secs: 900,
    }
}
fn default_ai_window() -> SlidingWindowConfig {
    SlidingWindowConfig {
        enabled: true,
        limit: 10,
        window_secs: 3600,
        violation_threshold: default_violation_threshold(),
        violation_ttl_secs: default_violation_ttl(),
        ban_ttl_secs: default_ban_ttl(),
    }
}
fn default_api_window() -> SlidingWindowConfig {
    SlidingWindowConfig {
        enabled: true,
        limit: 30,
        window_secs: 60,
        violation_threshold: default_violation_threshold(),
        violation_ttl_secs: default_violation_ttl(),
        ban_ttl_secs: default_ban_ttl(),
    }
}
fn default_queue_key() -> String {
    "queue:letters".to_string()
}
fn default_job_ttl() -> u64 {
    24 * 3600
}
fn default_max_retries() -> u32 {
    3
}
fn default_dequeue_timeout() -> u64 {
    5
}
fn default_estimated_duration() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.trim().is_empty() {
            anyhow::bail!("server.listen must not be empty");
        }

        for entry in &self.server.trusted_proxies {
            if parse_network(entry).is_none() {
                anyhow::bail!("server.trusted_proxies: invalid address or CIDR '{}'", entry);
            }
        }

        if self.store.backend == StoreBackend::Redis && self.store.url.trim().is_empty() {
            anyhow::bail!("store.url is required for the redis backend");
        }

        if self.store.op_timeout_ms == 0 {
            anyhow::bail!("store.op_timeout_ms must be greater than zero");
        }

        if self.access.bypass_min_confidence > 100 {
            anyhow::bail!(
                "access.bypass_min_confidence must be within 0..=100 (got {})",
                self.access.bypass_min_confidence
            );
        }

        if self.rate_limit.ai_daily.cap == 0 {
            anyhow::bail!("rate_limit.ai_daily.cap must be greater than zero");
        }

        for (class, window) in [
            ("global", &self.rate_limit.global),
            ("ai", &self.rate_limit.ai),
            ("api", &self.rate_limit.api),
        ] {
            if window.limit == 0 || window.window_secs == 0 {
                anyhow::bail!(
                    "rate_limit.{} needs a non-zero limit and window (limit={}, window_secs={})",
                    class,
                    window.limit,
                    window.window_secs
                );
            }
            if window.violation_threshold == 0 {
                anyhow::bail!("rate_limit.{}.violation_threshold must be greater than zero", class);
            }
        }

        if self.profile.enrichment.enabled && self.profile.enrichment.endpoint.is_none() {
            anyhow::bail!("profile.enrichment.endpoint is required when enrichment is enabled");
        }

        if self.jobs.ttl_secs == 0 {
            anyhow::bail!("jobs.ttl_secs must be greater than zero");
        }

        Ok(())
    }
}

/// Parse a CIDR range or a bare address (as a host-sized network).
pub fn parse_network(entry: &str) -> Option<IpNet> {
    let trimmed = entry.trim();
    if let Ok(network) = trimmed.parse::<IpNet>() {
        return Some(network);
    }
    let addr = trimmed.parse::<IpAddr>().ok()?;
    match addr {
        IpAddr::V4(_) => IpNet::new(addr, 32).ok(),
        IpAddr::V6(_) => IpNet::new(addr, 128).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();

        assert_eq!(config.access.min_visits, 3);
        assert_eq!(config.access.bypass_min_confidence, 60);
        assert_eq!(config.rate_limit.ai_daily.cap, 5);
        assert_eq!(config.rate_limit.ai_daily.cooldown_secs, 120);
        assert_eq!(config.jobs.ttl_secs, 86_400);
        assert_eq!(config.jobs.queue, "queue:letters");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn partial_window_override_keeps_ban_defaults() {
        let yaml = r#"
rate_limit:
  api:
    limit: 10
    window_secs: 30
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_limit.api.limit, 10);
        assert_eq!(config.rate_limit.api.violation_threshold, 5);
        assert_eq!(config.rate_limit.api.ban_ttl_secs, 3600);
        assert_eq!(config.rate_limit.global.limit, 100);
    }

    #[test]
    fn trusted_proxies_accept_addresses_and_ranges() {
        let yaml = r#"
server:
  trusted_proxies: ["10.0.0.0/8", "127.0.0.1", "::1"]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let range = parse_network("10.0.0.0/8").unwrap();
        assert!(range.contains(&"10.1.2.3".parse::<IpAddr>().unwrap()));
        let host = parse_network("127.0.0.1").unwrap();
        assert!(host.contains(&"127.0.0.1".parse::<IpAddr>().unwrap()));
        assert!(!host.contains(&"127.0.0.2".parse::<IpAddr>().unwrap()));

        let mut config = AppConfig::default();
        config.server.trusted_proxies = vec!["proxy.internal".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_window() {
        let mut config = AppConfig::default();
        config.rate_limit.ai.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_enrichment_without_endpoint() {
        let mut config = AppConfig::default();
        config.profile.enrichment.enabled = true;
        assert!(config.validate().is_err());
    }
}
