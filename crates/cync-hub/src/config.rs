//! Hub configuration

use cync_core::{DEFAULT_RELAY_HOST, DEFAULT_RELAY_PORT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and endpoint settings for a hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Relay host name
    pub relay_host: String,
    /// Relay TCP port
    pub relay_port: u16,
    /// Interval between keep-alive pings
    pub ping_interval_ms: u64,
    /// Interval between per-device connection checks
    pub liveness_interval_ms: u64,
    /// Minimum time between a successful connection and the next reconnect attempt
    pub reconnect_spacing_ms: u64,
    /// TCP keepalive (0 = disabled)
    pub keepalive_secs: u64,
}

impl HubConfig {
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay_host, self.relay_port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn reconnect_spacing(&self) -> Duration {
        Duration::from_millis(self.reconnect_spacing_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            relay_host: DEFAULT_RELAY_HOST.to_string(),
            relay_port: DEFAULT_RELAY_PORT,
            ping_interval_ms: 180_000,
            liveness_interval_ms: 300_000,
            reconnect_spacing_ms: 10_000,
            keepalive_secs: 30,
        }
    }
}
