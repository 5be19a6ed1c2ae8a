//! `ledger-api.toml`: link base URL, stream timing, and ledger history sizing.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use actions::StreamConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ledger API configuration (TOML).
///
/// Every field has a default, so a missing file or a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Public base URL used when building resource links.
    pub base_url: String,

    pub stream: StreamSection,

    pub ledger: LedgerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSection {
    /// Reconnect delay advertised in each stream preamble, in milliseconds.
    pub retry_ms: u64,

    /// Re-evaluation interval for streams without a topic, in milliseconds.
    pub idle_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerSection {
    /// How often the ingester closes a new ledger, in milliseconds.
    pub close_interval_ms: u64,

    /// Number of most recent ledgers kept in history.
    pub retention: usize,

    /// Ledgers closed at startup so history is not empty.
    pub seed_ledgers: u32,

    /// History older than this (newest ledger close time) is reported as stale.
    pub stale_threshold_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            retry_ms: 1_000,
            idle_interval_ms: 1_000,
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            close_interval_ms: 5_000,
            retention: 1_000,
            seed_ledgers: 10,
            stale_threshold_secs: 60,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            stream: StreamSection::default(),
            ledger: LedgerSection::default(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must be non-empty"));
        }
        if self.stream.retry_ms == 0 {
            return Err(anyhow!("stream.retry_ms must be > 0"));
        }
        if self.stream.idle_interval_ms == 0 {
            return Err(anyhow!("stream.idle_interval_ms must be > 0"));
        }
        if self.ledger.close_interval_ms == 0 {
            return Err(anyhow!("ledger.close_interval_ms must be > 0"));
        }
        if self.ledger.retention == 0 {
            return Err(anyhow!("ledger.retention must be > 0"));
        }
        if self.ledger.stale_threshold_secs == 0 {
            return Err(anyhow!("ledger.stale_threshold_secs must be > 0"));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            retry: Duration::from_millis(self.stream.retry_ms),
            idle_interval: Duration::from_millis(self.stream.idle_interval_ms),
        }
    }

    pub fn close_interval(&self) -> Duration {
        Duration::from_millis(self.ledger.close_interval_ms)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.ledger.stale_threshold_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Read `path`, or fall back to the built-in defaults when it does not exist.
///
/// The result is validated in both cases.
pub fn load_config(path: &Path) -> Result<ApiConfig> {
    let cfg = match fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<ApiConfig>(&contents)
            .with_context(|| format!("parse {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            ApiConfig::default()
        }
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
