use std::sync::Arc;
use std::time::Instant;

use lettergate_access::AccessGate;
use ipnet::IpNet;
use lettergate_common::{parse_network, AppConfig, KeySpace};
use lettergate_jobs::JobPipeline;
use lettergate_profile::ProfileDetector;
use lettergate_rate_limit::RateLimiter;
use lettergate_store::SharedStore;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Everything a handler needs: configuration, the control-plane components
/// and metrics.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn SharedStore>,
    pub gate: AccessGate,
    pub limiter: RateLimiter,
    pub jobs: JobPipeline,
    pub metrics: GateMetrics,
    /// Peers allowed to report the client address in forwarding headers.
    pub trusted_proxies: Vec<IpNet>,
    pub start_time: Instant,
}

/// Prometheus metrics collected by the control plane.
pub struct GateMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub request_duration: HistogramVec,
    pub access_decisions: IntCounterVec,
    pub rate_limited: IntCounterVec,
    pub fail_open: IntCounterVec,
    pub profiles_detected: IntCounterVec,
    pub bypass_promotions: IntCounter,
    pub jobs: IntCounterVec,
}

impl GateMetrics {
    /// Create all counters and histograms and register them against a fresh
    /// registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "lettergate_requests_total",
            "Total number of API requests handled",
        ))
        .expect("failed to create requests_total counter");

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "lettergate_request_duration_seconds",
                "API request duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["method", "status"],
        )
        .expect("failed to create request_duration histogram");

        let access_decisions = IntCounterVec::new(
            Opts::new(
                "lettergate_access_decisions_total",
                "Access gate decisions by outcome and reason",
            ),
            &["outcome", "reason"],
        )
        .expect("failed to create access_decisions counter");

        let rate_limited = IntCounterVec::new(
            Opts::new(
                "lettergate_rate_limited_total",
                "Requests denied by a rate limiter",
            ),
            &["limiter", "reason"],
        )
        .expect("failed to create rate_limited counter");

        let fail_open = IntCounterVec::new(
            Opts::new(
                "lettergate_rate_limit_fail_open_total",
                "Limiter checks allowed because the store was unavailable",
            ),
            &["limiter"],
        )
        .expect("failed to create fail_open counter");

        let profiles_detected = IntCounterVec::new(
            Opts::new(
                "lettergate_profiles_detected_total",
                "Visitor profiles by detected type",
            ),
            &["profile"],
        )
        .expect("failed to create profiles_detected counter");

        let bypass_promotions = IntCounter::with_opts(Opts::new(
            "lettergate_bypass_promotions_total",
            "Bypass flags issued to high-value profiles",
        ))
        .expect("failed to create bypass_promotions counter");

        let jobs = IntCounterVec::new(
            Opts::new("lettergate_jobs_total", "Letter job lifecycle events"),
            &["event"],
        )
        .expect("failed to create jobs counter");

        registry.register(Box::new(requests_total.clone())).expect("failed to register requests_total");
        registry.register(Box::new(request_duration.clone())).expect("failed to register request_duration");
        registry.register(Box::new(access_decisions.clone())).expect("failed to register access_decisions");
        registry.register(Box::new(rate_limited.clone())).expect("failed to register rate_limited");
        registry.register(Box::new(fail_open.clone())).expect("failed to register fail_open");
        registry.register(Box::new(profiles_detected.clone())).expect("failed to register profiles_detected");
        registry.register(Box::new(bypass_promotions.clone())).expect("failed to register bypass_promotions");
        registry.register(Box::new(jobs.clone())).expect("failed to register jobs");

        Self {
            registry,
            requests_total,
            request_duration,
            access_decisions,
            rate_limited,
            fail_open,
            profiles_detected,
            bypass_promotions,
            jobs,
        }
    }

    pub fn job_event(&self, event: &str) {
        self.jobs.with_label_values(&[event]).inc();
    }

    /// Text exposition of the registry with its content type.
    pub fn render(&self) -> prometheus::Result<(String, String)> {
        let encoder = TextEncoder::new();
        let body = encoder.encode_to_string(&self.registry.gather())?;
        Ok((encoder.format_type().to_string(), body))
    }

    /// Sum of a counter vector across all label values.
    pub fn total(counter: &IntCounterVec) -> u64 {
        use prometheus::core::Collector;
        counter
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Build the control plane on top of `store` using the configured
    /// profile detector.
    pub fn new(config: AppConfig, store: Arc<dyn SharedStore>) -> anyhow::Result<Self> {
        let detector = ProfileDetector::from_config(&config.profile)?;
        Ok(Self::with_detector(config, store, detector))
    }

    pub fn with_detector(
        config: AppConfig,
        store: Arc<dyn SharedStore>,
        detector: ProfileDetector,
    ) -> Self {
        let keys = KeySpace::new(config.store.key_prefix.clone());
        let gate = AccessGate::new(
            Arc::clone(&store),
            keys.clone(),
            Arc::new(detector),
            config.access.clone(),
        );
        let limiter = RateLimiter::new(Arc::clone(&store), keys.clone(), &config.rate_limit);
        let jobs = JobPipeline::new(Arc::clone(&store), keys, config.jobs.clone());
        let trusted_proxies = config
            .server
            .trusted_proxies
            .iter()
            .filter_map(|entry| {
                let network = parse_network(entry);
                if network.is_none() {
                    tracing::warn!(entry = %entry, "ignoring invalid trusted proxy");
                }
                network
            })
            .collect();

        Self {
            config,
            store,
            gate,
            limiter,
            jobs,
            metrics: GateMetrics::new(),
            trusted_proxies,
            start_time: Instant::now(),
        }
    }
}
