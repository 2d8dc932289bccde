/*
[INPUT]:  YAML configuration file or in-code defaults
[OUTPUT]: Parsed feed configuration
[POS]:    Configuration layer - feed setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};
use solx_feed_adapter::FeedError;

/// Top-level configuration for the market feed service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Feed WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Base reconnect delay in milliseconds; doubles each failed cycle
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Reconnect attempts before the policy gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Heartbeat interval in seconds, active only while connected
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Levels per side returned by depth-unspecified book reads
    #[serde(default = "default_depth")]
    pub default_depth: usize,
    /// Book updates buffered per market while waiting for a snapshot
    #[serde(default = "default_pending_update_limit")]
    pub pending_update_limit: usize,
    /// Ticker age in milliseconds beyond which a symbol reads as stale
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            ping_interval_secs: default_ping_interval_secs(),
            default_depth: default_depth(),
            pending_update_limit: default_pending_update_limit(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

fn default_ws_url() -> String {
    "wss://feed.solx.trade/ws/".to_string()
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_depth() -> usize {
    15
}

fn default_pending_update_limit() -> usize {
    64
}

fn default_stale_after_ms() -> u64 {
    5000
}

impl FeedConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.ws_url.is_empty() {
            return Err(FeedError::Config("ws_url must not be empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(FeedError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.default_depth == 0 {
            return Err(FeedError::Config(
                "default_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}
