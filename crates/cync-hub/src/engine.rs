//! Sans-IO hub engine
//!
//! [`HubEngine`] owns the connection state machine, the outbound queue, the
//! device registry and every timer. It never touches a socket or a clock:
//! callers feed it the current instant and transport outcomes, then drain
//! [`EngineAction`]s to perform and [`HubEvent`]s to publish.

use bytes::Bytes;
use cync_core::{command, Device, Home, Packet};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::Credentials;
use crate::config::HubConfig;
use crate::light::{Characteristic, Control, DeviceRegistry, Light};
use crate::queue::{CommandQueue, QueuedPacket};
use crate::{HubError, Result};

/// Relay session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
}

/// IO the driver must perform on behalf of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Release any current socket, fetch credentials and open a new one
    Open,
    /// Write raw bytes to the current socket; lost if the socket is gone
    Write(Bytes),
    /// Write a queue entry; hand it back through
    /// [`on_send_failed`](HubEngine::on_send_failed) if the socket refuses it
    Send(QueuedPacket),
    /// Release the current socket
    Close,
}

/// Notifications for the accessory layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected,
    Disconnected,
    AuthenticationFailed { code: u16 },
    ConnectionFailed { reason: String },
    CharacteristicChanged {
        device_id: u32,
        characteristic: Characteristic,
    },
}

/// Snapshot of the engine for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStatus {
    pub state: ConnectionState,
    pub auth_failed: bool,
    pub queued: usize,
    pub devices: usize,
}

/// The protocol state machine
#[derive(Debug)]
pub struct HubEngine {
    config: HubConfig,
    state: ConnectionState,
    /// Set when the relay rejects our credentials; blocks automatic reconnects
    auth_failed: bool,
    connected_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    next_ping: Instant,
    seq: u16,
    pub(crate) queue: CommandQueue,
    pub(crate) registry: DeviceRegistry,
    /// Switch ids whose status is requested on the next tick
    pub(crate) pending_status: VecDeque<u32>,
    pub(crate) status_due: Option<Instant>,
    actions: VecDeque<EngineAction>,
    events: VecDeque<HubEvent>,
}

impl HubEngine {
    pub fn new(config: HubConfig, now: Instant) -> Self {
        let next_ping = now + config.ping_interval();
        Self {
            config,
            state: ConnectionState::Disconnected,
            auth_failed: false,
            connected_at: None,
            reconnect_at: None,
            next_ping,
            seq: 0,
            queue: CommandQueue::new(),
            registry: DeviceRegistry::new(),
            pending_status: VecDeque::new(),
            status_due: None,
            actions: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn status(&self) -> HubStatus {
        HubStatus {
            state: self.state,
            auth_failed: self.auth_failed,
            queued: self.queue.len(),
            devices: self.registry.len(),
        }
    }

    pub fn light(&self, device_id: u32) -> Option<&Light> {
        self.registry.get(device_id)
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// Start a connection attempt. No-op unless disconnected.
    ///
    /// An explicit call clears a previous authentication rejection.
    pub fn connect(&mut self, _now: Instant) {
        if self.state != ConnectionState::Disconnected {
            debug!("Connect ignored in state {:?}", self.state);
            return;
        }
        self.auth_failed = false;
        self.reconnect_at = None;
        self.state = ConnectionState::Connecting;
        info!("Connecting to {}", self.config.relay_addr());
        self.actions.push_back(EngineAction::Open);
    }

    /// The socket is open; authenticate straight away
    pub fn on_open(&mut self, credentials: &Credentials) {
        if self.state != ConnectionState::Connecting {
            warn!("Socket opened in state {:?}", self.state);
        }
        match command::auth(credentials.user_id, &credentials.authorize) {
            Ok(packet) => {
                self.state = ConnectionState::Authenticating;
                self.actions.push_back(EngineAction::Write(packet.encode()));
            }
            Err(e) => {
                self.actions.push_back(EngineAction::Close);
                self.on_credentials_failed(format!("unusable credentials: {}", e));
            }
        }
    }

    /// Opening the socket failed; retry after the reconnect spacing
    pub fn on_connect_failed(&mut self, reason: String, now: Instant) {
        warn!("Connection to relay failed: {}", reason);
        self.state = ConnectionState::Disconnected;
        self.reconnect_at = Some(now + self.config.reconnect_spacing());
        self.events.push_back(HubEvent::ConnectionFailed { reason });
    }

    /// The credential provider failed; this attempt is abandoned
    pub fn on_credentials_failed(&mut self, reason: String) {
        error!("Credentials unavailable: {}", reason);
        self.state = ConnectionState::Disconnected;
        self.events.push_back(HubEvent::ConnectionFailed { reason });
    }

    /// The socket ended or failed
    pub fn on_disconnect(&mut self, now: Instant) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        self.actions.push_back(EngineAction::Close);
        if was_connected {
            self.events.push_back(HubEvent::Disconnected);
        }

        if self.auth_failed {
            return;
        }

        let spacing = self.config.reconnect_spacing();
        let delay = match self.connected_at {
            Some(at) => spacing.saturating_sub(now.saturating_duration_since(at)),
            None => spacing,
        };
        info!("Disconnected from relay, reconnecting in {:?}", delay);
        self.reconnect_at = Some(now + delay);
    }

    /// A queue entry could not be written. It and every queue entry still
    /// waiting to be written go back to the head of the queue, in order, and
    /// the session is treated as lost.
    pub fn on_send_failed(&mut self, entry: QueuedPacket, now: Instant) {
        let mut unsent = vec![entry];
        let mut rest = VecDeque::with_capacity(self.actions.len());
        for action in self.actions.drain(..) {
            match action {
                EngineAction::Send(entry) => unsent.push(entry),
                other => rest.push_back(other),
            }
        }
        self.actions = rest;

        warn!("Write failed, requeued {} packets", unsent.len());
        self.queue.requeue_front(unsent);
        self.on_disconnect(now);
    }

    pub(crate) fn handle_auth(&mut self, code: u16, now: Instant) {
        if self.state != ConnectionState::Authenticating {
            debug!("Auth reply ignored in state {:?}", self.state);
            return;
        }

        if code == 0 {
            info!("Authenticated with relay");
            self.state = ConnectionState::Connected;
            self.connected_at = Some(now);
            self.events.push_back(HubEvent::Connected);
            self.flush();
        } else {
            error!("Relay rejected credentials with code {}", code);
            self.state = ConnectionState::Disconnected;
            self.auth_failed = true;
            self.reconnect_at = None;
            self.actions.push_back(EngineAction::Close);
            self.events.push_back(HubEvent::AuthenticationFailed { code });
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Next value of the shared sequence counter
    pub fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Queue a packet; it is written at once when connected
    pub fn send_packet(&mut self, packet: &Packet) {
        self.queue.enqueue(packet);
        if self.is_connected() {
            self.flush();
        }
    }

    /// Write a packet outside the queue, on the current socket
    pub(crate) fn write_now(&mut self, packet: &Packet) {
        self.actions.push_back(EngineAction::Write(packet.encode()));
    }

    fn flush(&mut self) {
        self.actions
            .extend(self.queue.drain().map(EngineAction::Send));
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Track a device and query its connection state right away
    pub fn register_device(&mut self, device: Device, home: Home, now: Instant) -> Result<&Light> {
        let device_id = device.device_id;
        let known = self.registry.get(device_id).is_some();
        let next_check = now + self.config.liveness_interval();
        let switch_id = self.registry.register(device, home, next_check)?.device().switch_id;

        if !known {
            info!("Registered device {} (switch {})", device_id, switch_id);
            let seq = self.next_seq();
            self.send_packet(&command::connection_query(switch_id, seq));
        }
        self.registry
            .get(device_id)
            .ok_or(HubError::UnknownDevice(device_id))
    }

    pub fn deregister_device(&mut self, device_id: u32) -> Result<()> {
        self.registry
            .deregister(device_id)
            .map(|_| info!("Deregistered device {}", device_id))
            .ok_or(HubError::UnknownDevice(device_id))
    }

    /// Apply a change optimistically and queue the matching command
    pub fn control(&mut self, device_id: u32, control: Control) -> Result<()> {
        if self.registry.get(device_id).is_none() {
            return Err(HubError::UnknownDevice(device_id));
        }
        let seq = self.next_seq();
        let light = self
            .registry
            .get_mut(device_id)
            .ok_or(HubError::UnknownDevice(device_id))?;
        let state = light.apply_control(control);
        let device = light.device();

        let packet = match control {
            Control::On(on) => command::set_on(device.switch_id, seq, device.mesh_id, on)?,
            _ => command::set_state(device.switch_id, seq, device.mesh_id, &state)?,
        };
        debug!("Device {} control {:?} -> {:?}", device_id, control, state);
        self.send_packet(&packet);
        Ok(())
    }

    pub(crate) fn characteristic_changed(&mut self, device_id: u32, changes: Vec<Characteristic>) {
        self.events.extend(
            changes
                .into_iter()
                .map(|characteristic| HubEvent::CharacteristicChanged {
                    device_id,
                    characteristic,
                }),
        );
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Earliest instant at which [`handle_timeout`](Self::handle_timeout) has work
    pub fn poll_timeout(&self) -> Option<Instant> {
        let liveness = self.registry.iter().map(|l| l.next_liveness).min();
        [Some(self.next_ping), self.reconnect_at, self.status_due, liveness]
            .into_iter()
            .flatten()
            .min()
    }

    /// Run every timer that is due at `now`
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if !self.auth_failed {
                self.connect(now);
            }
        }

        if self.next_ping <= now {
            self.next_ping = now + self.config.ping_interval();
            debug!("Sending ping");
            self.send_packet(&command::ping());
        }

        let interval = self.config.liveness_interval();
        let due: Vec<u32> = self
            .registry
            .iter_mut()
            .filter(|l| l.next_liveness <= now)
            .map(|l| {
                l.next_liveness = now + interval;
                l.device().switch_id
            })
            .collect();
        for switch_id in due {
            let seq = self.next_seq();
            self.send_packet(&command::connection_query(switch_id, seq));
        }

        if self.status_due.is_some_and(|at| at <= now) {
            self.status_due = None;
            while let Some(switch_id) = self.pending_status.pop_front() {
                let seq = self.next_seq();
                match command::status_query(switch_id, seq) {
                    Ok(packet) => self.send_packet(&packet),
                    Err(e) => warn!("Status query for switch {} failed: {}", switch_id, e),
                }
            }
        }
    }

    pub fn poll_action(&mut self) -> Option<EngineAction> {
        self.actions.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<HubEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials {
            user_id: 7,
            authorize: "token".into(),
        }
    }

    #[test]
    fn test_connect_is_gated() {
        let now = Instant::now();
        let mut engine = HubEngine::new(HubConfig::default(), now);

        engine.connect(now);
        engine.connect(now);
        assert_eq!(engine.poll_action(), Some(EngineAction::Open));
        assert_eq!(engine.poll_action(), None);
        assert_eq!(engine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_auth_written_on_open() {
        let now = Instant::now();
        let mut engine = HubEngine::new(HubConfig::default(), now);
        engine.connect(now);
        engine.poll_action();

        engine.on_open(&credentials());
        assert_eq!(engine.state(), ConnectionState::Authenticating);
        match engine.poll_action() {
            Some(EngineAction::Write(data)) => assert_eq!(data[0], 0x13),
            other => panic!("expected auth write, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_wraps() {
        let mut engine = HubEngine::new(HubConfig::default(), Instant::now());
        engine.seq = u16::MAX - 1;
        assert_eq!(engine.next_seq(), u16::MAX);
        assert_eq!(engine.next_seq(), 0);
    }

    #[test]
    fn test_poll_timeout_starts_at_ping() {
        let now = Instant::now();
        let engine = HubEngine::new(HubConfig::default(), now);
        assert_eq!(engine.poll_timeout(), Some(now + Duration::from_secs(180)));
    }
}
