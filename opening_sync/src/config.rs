//! Runtime configuration: TOML parsing, defaults and validation.
//!
//! Every section and field is optional; an empty file yields the defaults.
//! Unknown keys are rejected so a typo does not silently fall back to a
//! default.
//!
//! ```toml
//! database_url = "sqlite://openings.db"
//!
//! [policy]
//! ready_threshold = 1000
//! indexing_batch = 200
//! archiving_batch = 500
//!
//! [flush]
//! max_games = 50
//!
//! [lichess]
//! requests_per_minute = 30
//! ```
//!
//! Entrypoints: [`load_config_str`], [`load_config_path`].

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use game_ingestor::providers::lichess::LichessConfig;
use game_ingestor::retry::RetryPolicy;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use shared_utils::env::get_env_var_opt;

use crate::flush::FlushLimits;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// SQLite location. The `DATABASE_URL` environment variable wins.
    pub database_url: Option<String>,
    pub policy: PolicyCfg,
    pub flush: FlushCfg,
    pub lichess: LichessCfg,
}

/// Import pacing. These numbers are product policy, not protocol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyCfg {
    /// Indexed games needed before the graph is considered usable.
    pub ready_threshold: u64,
    /// Games fetched per invocation while indexing.
    pub indexing_batch: u32,
    /// Games fetched per invocation once ready.
    pub archiving_batch: u32,
    /// Stored games folded into the graph per invocation while indexing.
    pub indexing_slice: usize,
    /// Same, once ready.
    pub archiving_slice: usize,
    /// Scouted opponents: how far back to look.
    pub opponent_lookback_days: u32,
    /// Scouted opponents: games taken when the lookback window is empty.
    pub opponent_fallback_games: u32,
    pub lock_ttl_secs: u64,
}

impl Default for PolicyCfg {
    fn default() -> Self {
        Self {
            ready_threshold: 1000,
            indexing_batch: 200,
            archiving_batch: 500,
            indexing_slice: 200,
            archiving_slice: 500,
            opponent_lookback_days: 1095,
            opponent_fallback_games: 100,
            lock_ttl_secs: 60,
        }
    }
}

impl PolicyCfg {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlushCfg {
    pub max_games: usize,
    pub max_dirty_nodes: usize,
    pub max_age_ms: u64,
    /// Bound of the producer/consumer channel in streaming mode.
    pub channel_capacity: usize,
}

impl Default for FlushCfg {
    fn default() -> Self {
        Self {
            max_games: 50,
            max_dirty_nodes: 2000,
            max_age_ms: 2000,
            channel_capacity: 4,
        }
    }
}

impl FlushCfg {
    pub fn limits(&self) -> FlushLimits {
        FlushLimits {
            max_games: self.max_games,
            max_dirty_nodes: self.max_dirty_nodes,
            max_age: Duration::from_millis(self.max_age_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LichessCfg {
    pub base_url: String,
    /// Environment variable holding an optional API token.
    pub token_env: String,
    pub requests_per_minute: u32,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for LichessCfg {
    fn default() -> Self {
        Self {
            base_url: "https://lichess.org".into(),
            token_env: "LICHESS_TOKEN".into(),
            requests_per_minute: 30,
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl LichessCfg {
    /// Provider settings, reading the token from `token_env` if set.
    pub fn provider_config(&self) -> anyhow::Result<LichessConfig> {
        let requests_per_minute = NonZeroU32::new(self.requests_per_minute)
            .context("lichess.requests_per_minute must be > 0")?;
        Ok(LichessConfig {
            base_url: self.base_url.clone(),
            token: get_env_var_opt(&self.token_env).map(|t| SecretString::new(t.into())),
            requests_per_minute,
            retry: RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms)),
            ..LichessConfig::default()
        })
    }
}

impl AppConfig {
    /// Rejects values that would stall or spin the pipeline.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.policy;
        if p.ready_threshold == 0 {
            bail!("policy.ready_threshold must be > 0");
        }
        if p.indexing_batch == 0 || p.archiving_batch == 0 {
            bail!("policy batch sizes must be > 0");
        }
        if p.indexing_slice == 0 || p.archiving_slice == 0 {
            bail!("policy slice sizes must be > 0");
        }
        if p.opponent_fallback_games == 0 {
            bail!("policy.opponent_fallback_games must be > 0");
        }
        if p.lock_ttl_secs == 0 {
            bail!("policy.lock_ttl_secs must be > 0");
        }
        let f = &self.flush;
        if f.max_games == 0 || f.max_dirty_nodes == 0 {
            bail!("flush thresholds must be > 0");
        }
        if f.channel_capacity == 0 {
            bail!("flush.channel_capacity must be > 0");
        }
        if self.lichess.requests_per_minute == 0 {
            bail!("lichess.requests_per_minute must be > 0");
        }
        if self.lichess.base_url.trim().is_empty() {
            bail!("lichess.base_url cannot be empty");
        }
        Ok(())
    }

    /// `DATABASE_URL`, else the configured path.
    pub fn resolve_database_url(&self) -> anyhow::Result<String> {
        get_env_var_opt("DATABASE_URL")
            .or_else(|| self.database_url.clone())
            .context("no database: set DATABASE_URL or database_url in the config file")
    }
}

/// Parses and validates a TOML string.
pub fn load_config_str(s: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(s).context("parsing config TOML")?;
    cfg.validate()?;
    Ok(cfg)
}

/// Reads, parses and validates a TOML file.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    load_config_str(&text).with_context(|| format!("in {}", path.display()))
}
