//! Application state and configuration.

use std::sync::Arc;

use flowgate_ingest::{MemorySink, Pipeline, PolicyConfig, StoragePort};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080").
    pub bind_addr: String,

    /// Metrics HTTP server port (0 disables).
    pub metrics_port: u16,

    /// Pipeline policy handed to the orchestrator.
    pub policy: PolicyConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `FLOWGATE_BIND_ADDR`: server bind address (default: "0.0.0.0:8080")
    /// - `FLOWGATE_METRICS_PORT`: metrics port, 0 disables (default: 9090)
    /// - `MIN_ACCEPT_RATIO`: accept-ratio guardrail (default 0.10; empty/0/none disables)
    /// - `MIN_CCT_CONFIDENCE`: CCT confidence floor (default 0.70; 0 disables)
    /// - `AMBIGUITY_DELTA`: CCT ambiguity window (default 0.05)
    /// - `CCT_THRESHOLDS_JSON`: per-bucket threshold overrides
    /// - `ALLOW_MISSING_WATERMARK`: dev-only missing-watermark override
    /// - `POLICY_VERSION`: stamped on every batch (default "cct-policy/v1")
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("FLOWGATE_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let metrics_port = std::env::var("FLOWGATE_METRICS_PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(9090);

        let env = |name: &str| std::env::var(name).ok();
        let defaults = PolicyConfig::default();
        let policy = PolicyConfig {
            min_accept_ratio: PolicyConfig::parse_accept_ratio(env("MIN_ACCEPT_RATIO").as_deref()),
            min_cct_confidence: PolicyConfig::parse_confidence(
                env("MIN_CCT_CONFIDENCE").as_deref(),
                defaults.min_cct_confidence,
            ),
            ambiguity_delta: PolicyConfig::parse_confidence(
                env("AMBIGUITY_DELTA").as_deref(),
                defaults.ambiguity_delta,
            ),
            cct_thresholds: PolicyConfig::parse_threshold_overrides(
                env("CCT_THRESHOLDS_JSON").as_deref(),
            ),
            allow_missing_watermark: PolicyConfig::parse_flag(
                env("ALLOW_MISSING_WATERMARK").as_deref(),
            ),
            policy_version: env("POLICY_VERSION").unwrap_or(defaults.policy_version),
        };

        tracing::info!(
            bind_addr = %bind_addr,
            metrics_port,
            min_accept_ratio = ?policy.min_accept_ratio,
            min_cct_confidence = policy.min_cct_confidence,
            ambiguity_delta = policy.ambiguity_delta,
            threshold_overrides = policy.cct_thresholds.len(),
            allow_missing_watermark = policy.allow_missing_watermark,
            policy_version = %policy.policy_version,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            metrics_port,
            policy,
        })
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ingestion orchestrator.
    pub pipeline: Arc<Pipeline>,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// State backed by the in-memory sink. Development and test only;
    /// nothing survives a restart.
    pub fn new(config: Config) -> Self {
        Self::with_port(config, Arc::new(MemorySink::new()))
    }

    /// State backed by a caller-provided storage port.
    pub fn with_port(config: Config, port: Arc<dyn StoragePort>) -> Self {
        let pipeline = Arc::new(Pipeline::new(port, config.policy.clone()));
        Self {
            pipeline,
            config: Arc::new(config),
        }
    }
}
