//! Common test helpers for the Cync hub crates
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A fake relay that speaks the hub's framing, records what it receives
//!   and can push frames or hang up on demand

use bytes::{Bytes, BytesMut};
use cync_core::{Packet, PacketType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Fake Relay
// ============================================================================

enum RelayCommand {
    Send(Bytes),
    Hangup,
}

/// A single-client stand-in for the relay.
///
/// Connections are served one at a time. Every auth frame is answered with
/// the configured code; everything the hub writes is recorded in order.
pub struct FakeRelay {
    port: u16,
    frames: Arc<Mutex<Vec<Packet>>>,
    connections: Arc<AtomicU32>,
    commands: mpsc::UnboundedSender<RelayCommand>,
    handle: JoinHandle<()>,
}

impl FakeRelay {
    /// Start a relay that accepts any credentials
    pub async fn start() -> Self {
        Self::start_with_auth_code(0).await
    }

    /// Start a relay that answers auth frames with `code`
    pub async fn start_with_auth_code(code: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake relay");
        let port = listener.local_addr().expect("local addr").port();

        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicU32::new(0));
        let (commands, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(accept_loop(
            listener,
            code,
            frames.clone(),
            connections.clone(),
            rx,
        ));

        Self {
            port,
            frames,
            connections,
            commands,
            handle,
        }
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Everything received so far, in arrival order
    pub fn frames(&self) -> Vec<Packet> {
        self.frames.lock().clone()
    }

    pub fn frames_of(&self, packet_type: PacketType) -> Vec<Packet> {
        self.frames
            .lock()
            .iter()
            .filter(|p| p.packet_type == packet_type)
            .cloned()
            .collect()
    }

    /// Number of connections accepted so far
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Push a frame to the connected hub
    pub fn send(&self, packet: &Packet) {
        self.send_raw(packet.encode());
    }

    pub fn send_raw(&self, data: Bytes) {
        let _ = self.commands.send(RelayCommand::Send(data));
    }

    /// Close the current connection
    pub fn hangup(&self) {
        let _ = self.commands.send(RelayCommand::Hangup);
    }

    /// Wait until at least `count` frames of `packet_type` have arrived
    pub async fn wait_for_frames(
        &self,
        packet_type: PacketType,
        count: usize,
        max_wait: Duration,
    ) -> bool {
        wait_for(
            || async { self.frames_of(packet_type).len() >= count },
            DEFAULT_CHECK_INTERVAL,
            max_wait,
        )
        .await
    }

    /// Wait until at least `count` connections have been accepted
    pub async fn wait_for_connections(&self, count: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.connections, count, max_wait).await
    }
}

impl Drop for FakeRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    auth_code: u16,
    frames: Arc<Mutex<Vec<Packet>>>,
    connections: Arc<AtomicU32>,
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
) {
    while let Ok((socket, peer)) = listener.accept().await {
        debug!("Fake relay accepted {}", peer);
        connections.fetch_add(1, Ordering::SeqCst);
        serve(socket, auth_code, &frames, &mut commands).await;
        debug!("Fake relay closed {}", peer);
    }
}

async fn serve(
    mut socket: TcpStream,
    auth_code: u16,
    frames: &Mutex<Vec<Packet>>,
    commands: &mut mpsc::UnboundedReceiver<RelayCommand>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            read = socket.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                while let Ok(Some(packet)) = Packet::decode_buf(&mut buf) {
                    let is_auth = packet.packet_type == PacketType::Auth;
                    frames.lock().push(packet);
                    if is_auth {
                        let reply = Packet::response(PacketType::Auth, auth_code.to_be_bytes().to_vec());
                        if socket.write_all(&reply.encode()).await.is_err() {
                            return;
                        }
                    }
                }
            }

            command = commands.recv() => {
                match command {
                    Some(RelayCommand::Send(data)) => {
                        if socket.write_all(&data).await.is_err() {
                            return;
                        }
                    }
                    Some(RelayCommand::Hangup) | None => return,
                }
            }
        }
    }
}
