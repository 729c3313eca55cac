//! Cync Hub
//!
//! Keeps one authenticated session to the Cync relay and exposes the lights
//! behind it.
//!
//! # Example
//!
//! ```ignore
//! use cync_hub::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut hub = Hub::builder().static_credentials(1234, "token").spawn()?;
//!
//!     let home = Home { id: 1000, product_id: String::new() };
//!     let light = hub
//!         .handle()
//!         .register_device(Device::new(2007, 42, "Desk"), home)
//!         .await?;
//!
//!     hub.wait_connected().await?;
//!     light.set_brightness(60)?;
//!
//!     while let Some(event) = hub.next_event().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod builder;
pub mod config;
mod dispatcher;
pub mod engine;
pub mod error;
pub mod hub;
pub mod light;
pub mod queue;

pub use auth::{CredentialProvider, Credentials, StaticCredentials};
pub use builder::HubBuilder;
pub use config::HubConfig;
pub use engine::{ConnectionState, EngineAction, HubEngine, HubEvent, HubStatus};
pub use error::{HubError, Result};
pub use hub::{Hub, HubHandle, LightHandle};
pub use light::{Characteristic, Control};
pub use queue::QueuedPacket;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::auth::{CredentialProvider, Credentials, StaticCredentials};
    pub use crate::builder::HubBuilder;
    pub use crate::engine::HubEvent;
    pub use crate::error::{HubError, Result};
    pub use crate::hub::{Hub, HubHandle, LightHandle};
    pub use crate::light::Characteristic;
    pub use cync_core::{Device, DeviceState, Home};
}
