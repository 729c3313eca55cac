//! Cync Core
//!
//! Wire-level building blocks for the Cync hub protocol.
//!
//! This crate provides:
//! - Binary packet framing ([`Packet`], [`PacketType`], [`PacketSubtype`])
//! - Typed decoding of inbound packets ([`Message`])
//! - Outbound payload builders and checksums ([`command`])
//! - The device model and mesh addressing ([`Device`], [`Home`], [`DeviceState`])
//! - Color conversions used by device commands ([`color`])

pub mod color;
pub mod command;
pub mod device;
pub mod error;
pub mod message;
pub mod packet;

pub use device::{Capabilities, Device, DeviceState, Home};
pub use error::{Error, Result};
pub use message::{AuthReply, Message, StatusRecord, StatusUpdate};
pub use packet::{Packet, PacketSubtype, PacketType};

/// Default relay host
pub const DEFAULT_RELAY_HOST: &str = "cm.gelighting.com";

/// Default relay TCP port
pub const DEFAULT_RELAY_PORT: u16 = 23778;

/// Frame header size (type/flag byte + 4-byte length)
pub const HEADER_SIZE: usize = 5;
