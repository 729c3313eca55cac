//! Hub builder pattern

use cync_transport::{TcpConfig, TcpTransport, Transport};
use std::sync::Arc;
use tracing::info;

use crate::auth::{CredentialProvider, StaticCredentials};
use crate::config::HubConfig;
use crate::engine::HubEngine;
use crate::error::{HubError, Result};
use crate::hub::Hub;

/// Builder for a [`Hub`]
pub struct HubBuilder {
    config: HubConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
    auto_connect: bool,
}

impl HubBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            credentials: None,
            auto_connect: true,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the relay endpoint
    pub fn relay(mut self, host: &str, port: u16) -> Self {
        self.config.relay_host = host.to_string();
        self.config.relay_port = port;
        self
    }

    /// Set the credential source
    pub fn credentials(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Use fixed credentials
    pub fn static_credentials(self, user_id: u32, authorize: &str) -> Self {
        self.credentials(StaticCredentials::new(user_id, authorize))
    }

    /// Connect as soon as the hub starts (default: true)
    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Start the hub over TCP
    pub fn spawn(self) -> Result<Hub> {
        let transport = TcpTransport::with_config(TcpConfig {
            keepalive_secs: self.config.keepalive_secs,
            ..TcpConfig::default()
        });
        self.spawn_with_transport(transport)
    }

    /// Start the hub over any transport
    pub fn spawn_with_transport<T: Transport + 'static>(self, transport: T) -> Result<Hub> {
        let credentials = self
            .credentials
            .ok_or_else(|| HubError::Credentials("no credential provider configured".into()))?;

        info!("Starting hub for relay {}", self.config.relay_addr());
        let engine = HubEngine::new(self.config, tokio::time::Instant::now().into_std());
        let hub = Hub::spawn(engine, transport, credentials);

        if self.auto_connect {
            hub.handle().connect()?;
        }
        Ok(hub)
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
