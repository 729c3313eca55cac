//! TCP transport implementation
//!
//! Raw TCP connection to the Cync relay. Frames are delimited by the Cync
//! header: one type/flag byte followed by a 4-byte big-endian payload length.
//! Bytes are buffered until a whole frame is available; a frame cut off by
//! the end of the stream is dropped and logged.
//!
//! Outbound writes go through an unbounded channel so a sender never waits on
//! the IO task, which may itself be waiting for inbound frames to be consumed.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cync_core::packet::{declared_length, hex};
use cync_core::{Packet, HEADER_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent, TransportReceiver, TransportSender};

/// Maximum accepted payload size (64KB)
const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Inbound event buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum payload size in bytes
    pub max_payload_size: usize,
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
        }
    }
}

/// TCP transport
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn connect(&self, addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        info!("Connecting to {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if self.config.keepalive_secs > 0 {
            let socket = socket2::SockRef::from(&stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(std::time::Duration::from_secs(self.config.keepalive_secs));
            if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                warn!("Failed to enable TCP keepalive: {}", e);
            }
        }

        let connected = Arc::new(Mutex::new(true));
        let shutdown = Arc::new(Notify::new());
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<Bytes>();
        let (incoming_tx, incoming_rx) =
            mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

        let sender = TcpSender {
            tx: outgoing_tx,
            connected: connected.clone(),
            shutdown: shutdown.clone(),
        };
        let receiver = TcpReceiver { rx: incoming_rx };

        let io = IoLoop {
            outgoing_rx,
            incoming_tx,
            max_size: self.config.max_payload_size,
            read_buffer_size: self.config.read_buffer_size,
            connected,
            shutdown,
        };

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            io.run(reader, writer).await;
        });

        info!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }
}

/// State moved into the per-connection IO task
struct IoLoop {
    outgoing_rx: mpsc::UnboundedReceiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    max_size: usize,
    read_buffer_size: usize,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
}

impl IoLoop {
    async fn run(mut self, mut reader: OwnedReadHalf, mut writer: OwnedWriteHalf) {
        let mut read_buf = BytesMut::with_capacity(self.read_buffer_size);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    debug!("TCP transport closed locally");
                    // writes accepted before the close still go out
                    while let Ok(data) = self.outgoing_rx.try_recv() {
                        if writer.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    let _ = writer.shutdown().await;
                    break;
                }

                outgoing = self.outgoing_rx.recv() => {
                    let Some(data) = outgoing else {
                        let _ = writer.shutdown().await;
                        break;
                    };
                    trace!("TCP write {}", hex(&data));
                    if let Err(e) = writer.write_all(&data).await {
                        error!("TCP write error: {}", e);
                        self.emit(TransportEvent::Disconnected { reason: Some(e.to_string()) }).await;
                        break;
                    }
                }

                result = reader.read_buf(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            if !read_buf.is_empty() {
                                error!(
                                    "Dropping truncated frame: {} bytes buffered at end of stream",
                                    read_buf.len()
                                );
                            }
                            debug!("TCP connection closed");
                            self.emit(TransportEvent::Disconnected { reason: None }).await;
                            break;
                        }
                        Ok(_) => {
                            if !self.drain_frames(&mut read_buf).await {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("TCP read error: {}", e);
                            self.emit(TransportEvent::Disconnected { reason: Some(e.to_string()) }).await;
                            break;
                        }
                    }
                }
            }
        }

        *self.connected.lock() = false;
    }

    /// Deliver every complete frame in the buffer. Returns false when the
    /// connection must be torn down.
    async fn drain_frames(&self, read_buf: &mut BytesMut) -> bool {
        while read_buf.len() >= HEADER_SIZE {
            let len = match declared_length(&read_buf[..]) {
                Ok(len) => len,
                Err(_) => break,
            };

            if len > self.max_size {
                error!("Frame too large: {} > {}", len, self.max_size);
                self.emit(TransportEvent::Disconnected {
                    reason: Some(format!("Frame too large: {}", len)),
                })
                .await;
                return false;
            }

            match Packet::decode_buf(read_buf) {
                Ok(Some(packet)) => {
                    debug!(
                        "Got packet with type {:?}, length {}",
                        packet.packet_type,
                        packet.length()
                    );
                    if self.incoming_tx.send(TransportEvent::Frame(packet)).await.is_err() {
                        return false;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Undecodable frame: {}", e);
                    self.emit(TransportEvent::Error(e.to_string())).await;
                }
            }
        }
        true
    }

    async fn emit(&self, event: TransportEvent) {
        let _ = self.incoming_tx.send(event).await;
    }
}

/// TCP sender for writing frames
pub struct TcpSender {
    tx: mpsc::UnboundedSender<Bytes>,
    connected: Arc<Mutex<bool>>,
    shutdown: Arc<Notify>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.try_send(data)
    }

    fn try_send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        self.shutdown.notify_one();
        Ok(())
    }
}

/// TCP receiver for reading frames
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
