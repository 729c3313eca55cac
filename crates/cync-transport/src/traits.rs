//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use cync_core::Packet;

use crate::error::Result;

/// Events that can occur on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete frame was received
    Frame(Packet),
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Non-fatal error occurred
    Error(String),
}

/// Trait for sending encoded frames
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send an encoded frame, waiting for buffer space
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Send an encoded frame without waiting
    fn try_send(&self, data: Bytes) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection and stop its IO task
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving frames
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Something that can open a connection to the relay
#[async_trait]
pub trait Transport: Send + Sync {
    /// The sender type for this transport
    type Sender: TransportSender + 'static;
    /// The receiver type for this transport
    type Receiver: TransportReceiver + 'static;

    /// Connect to a remote endpoint (`host:port`)
    async fn connect(&self, addr: &str) -> Result<(Self::Sender, Self::Receiver)>;
}
