use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::info;

use crate::candidates::CandidateStoreConfig;
use crate::scoring::ScoreOptions;

/// Configuration for the trust engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WotConfig {
    /// Relay set configuration
    pub relays: RelayConfig,
    /// Scoring parameters
    pub scoring: ScoringConfig,
    /// Candidate queue configuration
    pub candidates: CandidateConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay WebSocket URLs to fan out to
    pub urls: Vec<String>,
    /// Per-relay deadline in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Half-life of attestation weight, in days
    pub half_life_days: f64,
    /// Recursive attester resolution depth budget
    pub max_depth: u32,
    /// Display-score gate for negative attestations
    pub negative_trust_gate: u32,
    /// Collapse repeat (author, target, type) records to the newest
    pub deduplicate: bool,
    /// Bonus multiplier for first-time attester edges
    pub novelty_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Hours before a pending candidate expires
    pub max_age_hours: u32,
    /// Queue capacity before eviction
    pub max_candidates: usize,
    /// Optional JSON file path for durable persistence
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
}

impl Default for WotConfig {
    fn default() -> Self {
        Self {
            relays: RelayConfig {
                urls: Vec::new(), // must be configured
                timeout_secs: 12,
            },
            scoring: ScoringConfig {
                half_life_days: 90.0,
                max_depth: 2,
                negative_trust_gate: 20,
                deduplicate: true,
                novelty_multiplier: 1.3,
            },
            candidates: CandidateConfig {
                max_age_hours: 24,
                max_candidates: 1_000,
                store_path: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl WotConfig {
    /// Load configuration from environment variables and validate it.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let relays = env::var("WOT_RELAYS")
            .context("WOT_RELAYS environment variable is required (comma-separated URLs)")?;
        config.relays.urls = relays
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        if let Ok(timeout) = env::var("WOT_RELAY_TIMEOUT_SECS") {
            config.relays.timeout_secs = timeout
                .parse()
                .context("Invalid WOT_RELAY_TIMEOUT_SECS value")?;
        }

        if let Ok(half_life) = env::var("WOT_HALF_LIFE_DAYS") {
            config.scoring.half_life_days = half_life
                .parse()
                .context("Invalid WOT_HALF_LIFE_DAYS value")?;
        }

        if let Ok(depth) = env::var("WOT_MAX_DEPTH") {
            config.scoring.max_depth = depth.parse().context("Invalid WOT_MAX_DEPTH value")?;
        }

        if let Ok(gate) = env::var("WOT_NEGATIVE_TRUST_GATE") {
            config.scoring.negative_trust_gate = gate
                .parse()
                .context("Invalid WOT_NEGATIVE_TRUST_GATE value")?;
        }

        if let Ok(dedup) = env::var("WOT_DEDUPLICATE") {
            config.scoring.deduplicate =
                dedup.parse().context("Invalid WOT_DEDUPLICATE value")?;
        }

        if let Ok(novelty) = env::var("WOT_NOVELTY_MULTIPLIER") {
            config.scoring.novelty_multiplier = novelty
                .parse()
                .context("Invalid WOT_NOVELTY_MULTIPLIER value")?;
        }

        if let Ok(hours) = env::var("WOT_CANDIDATE_MAX_AGE_HOURS") {
            config.candidates.max_age_hours = hours
                .parse()
                .context("Invalid WOT_CANDIDATE_MAX_AGE_HOURS value")?;
        }

        if let Ok(capacity) = env::var("WOT_CANDIDATE_CAPACITY") {
            config.candidates.max_candidates = capacity
                .parse()
                .context("Invalid WOT_CANDIDATE_CAPACITY value")?;
        }

        if let Ok(path) = env::var("WOT_CANDIDATE_STORE_PATH") {
            config.candidates.store_path = Some(path);
        }

        if let Ok(level) = env::var("WOT_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;

        info!(
            relays = config.relays.urls.len(),
            half_life_days = config.scoring.half_life_days,
            max_depth = config.scoring.max_depth,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.relays.urls.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one relay must be configured (WOT_RELAYS)"
            ));
        }
        for url in &self.relays.urls {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(anyhow::anyhow!(
                    "Relay URL must be a WebSocket URL (ws:// or wss://): {}",
                    url
                ));
            }
        }
        if self.relays.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Relay timeout must be non-zero"));
        }
        if self.scoring.half_life_days <= 0.0 {
            return Err(anyhow::anyhow!("Half-life must be positive"));
        }
        if self.scoring.novelty_multiplier <= 0.0 {
            return Err(anyhow::anyhow!("Novelty multiplier must be positive"));
        }
        if self.scoring.negative_trust_gate > 100 {
            return Err(anyhow::anyhow!(
                "Negative trust gate must be a display score in 0..=100"
            ));
        }
        if self.candidates.max_candidates == 0 {
            return Err(anyhow::anyhow!("Candidate capacity must be non-zero"));
        }
        Ok(())
    }

    /// Kernel options carried by this configuration.
    pub fn score_options(&self) -> ScoreOptions {
        ScoreOptions {
            half_life_days: self.scoring.half_life_days,
            depth: 0,
            max_depth: self.scoring.max_depth,
            negative_trust_gate: self.scoring.negative_trust_gate,
            deduplicate: self.scoring.deduplicate,
            novelty_multiplier: self.scoring.novelty_multiplier,
            now: None,
        }
    }

    /// Candidate store configuration carried by this configuration.
    pub fn candidate_store_config(&self) -> CandidateStoreConfig {
        CandidateStoreConfig {
            max_age: chrono::Duration::hours(i64::from(self.candidates.max_age_hours)),
            max_candidates: self.candidates.max_candidates,
        }
    }

    /// Per-relay deadline as a duration.
    pub fn relay_deadline(&self) -> Duration {
        Duration::from_secs(self.relays.timeout_secs)
    }
}
