//! CLI configuration file
//!
//! JSON by default; files ending in `.toml` are read as TOML.

use anyhow::{Context, Result};
use cync_core::{Device, Home};
use cync_hub::{Credentials, HubConfig};
use serde::Deserialize;
use std::path::Path;

/// A home and the devices registered in it
#[derive(Debug, Clone, Deserialize)]
pub struct HomeConfig {
    #[serde(flatten)]
    pub home: Home,
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    pub credentials: Credentials,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub homes: Vec<HomeConfig>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&text).context("Failed to parse TOML config")
        } else {
            serde_json::from_str(&text).context("Failed to parse JSON config")
        }
    }

    /// Every configured device with the home it belongs to
    pub fn devices(&self) -> impl Iterator<Item = (&Home, &Device)> {
        self.homes
            .iter()
            .flat_map(|h| h.devices.iter().map(move |d| (&h.home, d)))
    }

    pub fn find_device(&self, device_id: u32) -> Option<(&Home, &Device)> {
        self.devices().find(|(_, d)| d.device_id == device_id)
    }
}
