use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matcher::TitleMatchMode;

/// Resolution orchestrator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Provider polls while waiting on a cache-and-play download
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Delay before each poll
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a "not ready" outcome is remembered
    #[serde(default = "default_not_ready_ttl_secs")]
    pub not_ready_ttl_secs: u64,
    /// How long a resolved link is remembered
    #[serde(default = "default_link_ttl_secs")]
    pub link_ttl_secs: u64,
    /// Title comparison used by the file selector
    #[serde(default)]
    pub title_match: TitleMatchMode,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            not_ready_ttl_secs: default_not_ready_ttl_secs(),
            link_ttl_secs: default_link_ttl_secs(),
            title_match: TitleMatchMode::default(),
        }
    }
}

impl ResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn not_ready_ttl(&self) -> Duration {
        Duration::from_secs(self.not_ready_ttl_secs)
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs)
    }

    /// Longest time a cache-and-play resolution spends polling.
    pub fn max_poll_duration(&self) -> Duration {
        self.poll_interval() * self.poll_attempts
    }
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    11_000
}

fn default_not_ready_ttl_secs() -> u64 {
    60
}

fn default_link_ttl_secs() -> u64 {
    3600
}
