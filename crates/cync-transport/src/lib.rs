//! Cync Transport Layer
//!
//! This crate provides the connection to the Cync relay:
//! - Transport traits shared by every implementation
//! - TCP (the relay's only transport), with Cync frame reassembly

pub mod error;
pub mod traits;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

#[cfg(feature = "tcp")]
pub use tcp::{TcpConfig, TcpReceiver, TcpSender, TcpTransport};
