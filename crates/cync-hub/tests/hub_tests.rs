//! End-to-end hub tests
//!
//! Runs a real hub over TCP against the fake relay:
//! - Handshake, liveness query and the follow-up status query
//! - Inbound status acknowledgement and state publication
//! - Control commands, reconnect and auth rejection

use async_trait::async_trait;
use bytes::Bytes;
use cync_core::{Device, Home, Packet, PacketSubtype, PacketType};
use cync_hub::prelude::*;
use cync_hub::{ConnectionState, HubConfig};
use cync_test_utils::{wait_for, FakeRelay, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT};
use cync_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const USER_ID: u32 = 0x0a0b0c0d;
const SWITCH_ID: u32 = 0x1122_3344;

fn home() -> Home {
    Home {
        id: 1000,
        product_id: String::new(),
    }
}

fn config(relay: &FakeRelay) -> HubConfig {
    HubConfig {
        relay_host: relay.host().to_string(),
        relay_port: relay.port(),
        reconnect_spacing_ms: 100,
        ..HubConfig::default()
    }
}

fn start_hub(relay: &FakeRelay) -> Hub {
    Hub::builder()
        .config(config(relay))
        .static_credentials(USER_ID, "opaque-token")
        .spawn()
        .expect("hub should start")
}

async fn connected_hub(relay: &FakeRelay) -> Hub {
    let mut hub = start_hub(relay);
    timeout(DEFAULT_TIMEOUT, hub.wait_connected())
        .await
        .expect("timed out connecting")
        .expect("connection rejected");
    hub
}

fn subtype(packet: &Packet) -> u8 {
    packet.payload[13]
}

fn paginated_status_request(mesh: u8, on: u8, brightness: u8, rgb: [u8; 3]) -> Packet {
    let mut payload = vec![0u8; 22];
    payload[..7].copy_from_slice(&[1, 2, 3, 4, 0, 5, 0]);
    payload[13] = PacketSubtype::Paginated as u8;
    let mut record = [0u8; 24];
    record[0] = mesh;
    record[8] = on;
    record[12] = brightness;
    record[20..23].copy_from_slice(&rgb);
    payload.extend_from_slice(&record);
    Packet::new(PacketType::Status, payload)
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_auth_frame_is_first() {
    let relay = FakeRelay::start().await;
    let hub = connected_hub(&relay).await;

    let frames = relay.frames();
    assert_eq!(frames[0].packet_type, PacketType::Auth);
    let payload = &frames[0].payload;
    assert_eq!(payload[0], 0x03);
    assert_eq!(&payload[1..5], &USER_ID.to_be_bytes());
    assert_eq!(payload[6] as usize, "opaque-token".len());
    assert_eq!(payload[payload.len() - 1], 0xb4);

    let status = hub.handle().status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Connected);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_register_queries_connection_then_status() {
    let relay = FakeRelay::start().await;
    let hub = connected_hub(&relay).await;

    hub.handle()
        .register_device(Device::new(2007, SWITCH_ID, "Desk"), home())
        .await
        .unwrap();

    assert!(
        relay
            .wait_for_frames(PacketType::Connection, 1, DEFAULT_TIMEOUT)
            .await
    );
    let query = &relay.frames_of(PacketType::Connection)[0];
    assert_eq!(&query.payload[..4], &SWITCH_ID.to_be_bytes());

    let mut reply = SWITCH_ID.to_be_bytes().to_vec();
    reply.extend_from_slice(&[0, 1, 0]);
    relay.send(&Packet::response(PacketType::Connection, reply));

    assert!(
        wait_for(
            || async {
                relay
                    .frames_of(PacketType::Status)
                    .iter()
                    .any(|p| subtype(p) == PacketSubtype::Paginated as u8)
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );
    hub.shutdown().await;
}

// ============================================================================
// Inbound status
// ============================================================================

#[tokio::test]
async fn test_status_request_is_acked_and_published() {
    let relay = FakeRelay::start().await;
    let mut hub = connected_hub(&relay).await;

    let light = hub
        .handle()
        .register_device(Device::new(2007, SWITCH_ID, "Desk"), home())
        .await
        .unwrap();
    let mut state = light.subscribe();

    relay.send(&paginated_status_request(7, 1, 80, [10, 20, 30]));

    timeout(DEFAULT_TIMEOUT, state.wait_for(|s| s.brightness == 80))
        .await
        .expect("timed out waiting for state")
        .unwrap();
    let current = light.state();
    assert!(current.on);
    assert_eq!(current.rgb, [10, 20, 30]);
    assert_eq!(current.color_temp, 13);

    assert!(
        wait_for(
            || async {
                relay
                    .frames_of(PacketType::Status)
                    .iter()
                    .any(|p| p.is_response && p.payload[..] == [1u8, 2, 3, 4, 0, 5, 0])
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );

    let event = timeout(DEFAULT_TIMEOUT, async {
        loop {
            match hub.next_event().await {
                Some(HubEvent::CharacteristicChanged {
                    characteristic: Characteristic::Brightness(b),
                    ..
                }) => return b,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(event, 80);
    hub.shutdown().await;
}

// ============================================================================
// Control
// ============================================================================

#[tokio::test]
async fn test_set_on_reaches_relay() {
    let relay = FakeRelay::start().await;
    let hub = connected_hub(&relay).await;

    let light = hub
        .handle()
        .register_device(Device::new(2007, SWITCH_ID, "Desk"), home())
        .await
        .unwrap();
    let mut state = light.subscribe();
    light.set_on(true).unwrap();
    // applied locally without waiting for the relay
    timeout(DEFAULT_TIMEOUT, state.wait_for(|s| s.on))
        .await
        .unwrap()
        .unwrap();

    assert!(
        wait_for(
            || async {
                relay
                    .frames_of(PacketType::Status)
                    .iter()
                    .any(|p| subtype(p) == PacketSubtype::SetOn as u8)
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );
    hub.shutdown().await;
}

#[tokio::test]
async fn test_commands_before_connect_are_flushed_in_order() {
    let relay = FakeRelay::start().await;
    let mut hub = Hub::builder()
        .config(config(&relay))
        .static_credentials(USER_ID, "opaque-token")
        .auto_connect(false)
        .spawn()
        .unwrap();

    let light = hub
        .handle()
        .register_device(Device::new(2007, SWITCH_ID, "Desk"), home())
        .await
        .unwrap();
    light.set_on(true).unwrap();
    light.set_brightness(25).unwrap();

    assert_eq!(hub.handle().status().await.unwrap().queued, 3);
    hub.handle().connect().unwrap();
    timeout(DEFAULT_TIMEOUT, hub.wait_connected())
        .await
        .unwrap()
        .unwrap();

    assert!(relay.wait_for_frames(PacketType::Status, 2, DEFAULT_TIMEOUT).await);
    let frames = relay.frames();
    let types: Vec<_> = frames.iter().map(|p| p.packet_type).collect();
    assert_eq!(
        &types[..4],
        &[
            PacketType::Auth,
            PacketType::Connection,
            PacketType::Status,
            PacketType::Status
        ]
    );
    assert_eq!(subtype(&frames[2]), PacketSubtype::SetOn as u8);
    assert_eq!(subtype(&frames[3]), PacketSubtype::SetState as u8);
    hub.shutdown().await;
}

// ============================================================================
// Connection failures
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_relay_hangup() {
    let relay = FakeRelay::start().await;
    let mut hub = connected_hub(&relay).await;

    relay.hangup();
    assert!(relay.wait_for_connections(2, DEFAULT_TIMEOUT).await);
    timeout(DEFAULT_TIMEOUT, hub.wait_connected())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relay.frames_of(PacketType::Auth).len(), 2);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_auth_rejection_stops_reconnecting() {
    let relay = FakeRelay::start_with_auth_code(1).await;
    let mut hub = start_hub(&relay);

    let result = timeout(DEFAULT_TIMEOUT, hub.wait_connected()).await.unwrap();
    assert!(matches!(result, Err(HubError::AuthenticationRejected(1))));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(relay.connections(), 1);

    let status = hub.handle().status().await.unwrap();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(status.auth_failed);
    hub.shutdown().await;
}

/// Accepts every auth frame, but the first connection refuses all other writes
#[derive(Clone, Default)]
struct FlakyTransport {
    connections: Arc<AtomicU32>,
    written: Arc<Mutex<Vec<(u32, Bytes)>>>,
}

impl FlakyTransport {
    fn written_on(&self, connection: u32) -> Vec<Bytes> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == connection)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

struct FlakySender {
    connection: u32,
    written: Arc<Mutex<Vec<(u32, Bytes)>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl TransportSender for FlakySender {
    async fn send(&self, data: Bytes) -> cync_transport::Result<()> {
        self.try_send(data)
    }

    fn try_send(&self, data: Bytes) -> cync_transport::Result<()> {
        let is_auth = data[0] == 0x13;
        if !is_auth && self.connection == 1 {
            return Err(TransportError::ConnectionClosed);
        }
        self.written.lock().unwrap().push((self.connection, data));
        if is_auth {
            let reply = Packet::response(PacketType::Auth, vec![0, 0]);
            let _ = self.events.send(TransportEvent::Frame(reply));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> cync_transport::Result<()> {
        Ok(())
    }
}

struct FlakyReceiver {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for FlakyReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    type Sender = FlakySender;
    type Receiver = FlakyReceiver;

    async fn connect(&self, _addr: &str) -> cync_transport::Result<(FlakySender, FlakyReceiver)> {
        let connection = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((
            FlakySender {
                connection,
                written: self.written.clone(),
                events: tx,
            },
            FlakyReceiver { events: rx },
        ))
    }
}

#[tokio::test]
async fn test_queued_commands_survive_failed_flush() {
    let transport = FlakyTransport::default();
    let mut hub = Hub::builder()
        .config(HubConfig {
            reconnect_spacing_ms: 50,
            ..HubConfig::default()
        })
        .static_credentials(USER_ID, "opaque-token")
        .auto_connect(false)
        .spawn_with_transport(transport.clone())
        .unwrap();

    let light = hub
        .handle()
        .register_device(Device::new(2007, SWITCH_ID, "Desk"), home())
        .await
        .unwrap();
    light.set_on(true).unwrap();
    light.set_on(false).unwrap();
    assert_eq!(hub.handle().status().await.unwrap().queued, 3);

    hub.handle().connect().unwrap();
    timeout(DEFAULT_TIMEOUT, hub.wait_connected())
        .await
        .unwrap()
        .unwrap();

    assert!(
        wait_for(
            || async { transport.written_on(2).len() >= 4 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );
    assert_eq!(transport.written_on(1).len(), 1);

    let second = transport.written_on(2);
    let headers: Vec<u8> = second.iter().map(|data| data[0]).collect();
    assert_eq!(headers, vec![0x13, 0xa3, 0x73, 0x73]);
    assert_eq!(second[2][5 + 13], PacketSubtype::SetOn as u8);
    assert_eq!(second[3][5 + 13], PacketSubtype::SetOn as u8);
    assert_eq!(hub.handle().status().await.unwrap().queued, 0);
    hub.shutdown().await;
}

struct FailingCredentials;

#[async_trait]
impl CredentialProvider for FailingCredentials {
    async fn credentials(&self) -> cync_hub::Result<Credentials> {
        Err(HubError::Credentials("token expired".into()))
    }
}

#[tokio::test]
async fn test_credential_failure_is_reported() {
    let relay = FakeRelay::start().await;
    let mut hub = Hub::builder()
        .config(config(&relay))
        .credentials(FailingCredentials)
        .spawn()
        .unwrap();

    let event = timeout(DEFAULT_TIMEOUT, hub.next_event()).await.unwrap();
    assert!(matches!(event, Some(HubEvent::ConnectionFailed { .. })));
    assert_eq!(relay.connections(), 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_builder_requires_credentials() {
    assert!(matches!(
        Hub::builder().spawn(),
        Err(HubError::Credentials(_))
    ));
}
