//! Hub driver and handles
//!
//! A single task owns the [`HubEngine`] and is the only place protocol state
//! changes. Handles talk to it over an unbounded channel and never wait for
//! the relay.

use bytes::Bytes;
use cync_core::{Device, DeviceState, Home};
use cync_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::CredentialProvider;
use crate::builder::HubBuilder;
use crate::engine::{EngineAction, HubEngine, HubEvent, HubStatus};
use crate::error::{HubError, Result};
use crate::light::Control;
use crate::queue::QueuedPacket;

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

enum HubCommand {
    Connect,
    Register {
        device: Device,
        home: Home,
        reply: oneshot::Sender<Result<(Device, watch::Receiver<DeviceState>)>>,
    },
    Deregister {
        device_id: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    Control {
        device_id: u32,
        control: Control,
    },
    Status {
        reply: oneshot::Sender<HubStatus>,
    },
    Shutdown,
}

/// Cloneable handle to a running hub
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, command: HubCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| HubError::NotRunning)
    }

    /// Start connecting to the relay; no-op while a session is active
    pub fn connect(&self) -> Result<()> {
        self.send(HubCommand::Connect)
    }

    /// Register a device for status routing and control
    pub async fn register_device(&self, device: Device, home: Home) -> Result<LightHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Register {
            device,
            home,
            reply,
        })?;
        let (device, state) = rx.await.map_err(|_| HubError::NotRunning)??;
        Ok(LightHandle {
            hub: self.clone(),
            device,
            state,
        })
    }

    pub async fn deregister_device(&self, device_id: u32) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Deregister { device_id, reply })?;
        rx.await.map_err(|_| HubError::NotRunning)?
    }

    pub async fn status(&self) -> Result<HubStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Status { reply })?;
        rx.await.map_err(|_| HubError::NotRunning)
    }

    fn control(&self, device_id: u32, control: Control) -> Result<()> {
        self.send(HubCommand::Control { device_id, control })
    }
}

/// Accessory-facing handle for one registered light.
///
/// Setters update local state immediately and queue one command. They do not
/// wait for the relay and nothing is rolled back if the command is lost; the
/// next status report from the device wins.
#[derive(Clone)]
pub struct LightHandle {
    hub: HubHandle,
    device: Device,
    state: watch::Receiver<DeviceState>,
}

impl LightHandle {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_id(&self) -> u32 {
        self.device.device_id
    }

    /// Current logical state
    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    /// Watch every state change, local or reported
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.clone()
    }

    pub fn set_on(&self, on: bool) -> Result<()> {
        self.hub.control(self.device.device_id, Control::On(on))
    }

    /// Brightness in percent
    pub fn set_brightness(&self, brightness: u8) -> Result<()> {
        self.hub
            .control(self.device.device_id, Control::Brightness(brightness))
    }

    /// Hue in degrees, keeping saturation and value
    pub fn set_hue(&self, hue: f64) -> Result<()> {
        self.hub.control(self.device.device_id, Control::Hue(hue))
    }

    /// Saturation in percent, keeping hue and value
    pub fn set_saturation(&self, saturation: f64) -> Result<()> {
        self.hub
            .control(self.device.device_id, Control::Saturation(saturation))
    }

    /// Color temperature in mireds
    pub fn set_color_temperature(&self, mired: u16) -> Result<()> {
        self.hub
            .control(self.device.device_id, Control::ColorTemperature(mired))
    }
}

/// A running hub: the handle plus its event stream
pub struct Hub {
    handle: HubHandle,
    events: mpsc::UnboundedReceiver<HubEvent>,
    task: Option<JoinHandle<()>>,
}

impl Hub {
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    pub(crate) fn spawn<T: Transport + 'static>(
        engine: HubEngine,
        transport: T,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let driver = Driver {
            addr: engine.config().relay_addr(),
            engine,
            transport,
            credentials,
            commands,
            events: events_tx,
            sender: None,
            receiver: None,
        };
        let task = tokio::spawn(driver.run());

        Self {
            handle: HubHandle { tx },
            events,
            task: Some(task),
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Event stream for the accessory layer
    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<HubEvent> {
        &mut self.events
    }

    pub async fn next_event(&mut self) -> Option<HubEvent> {
        self.events.recv().await
    }

    /// Wait until the relay accepts the session
    pub async fn wait_connected(&mut self) -> Result<()> {
        loop {
            match self.events.recv().await {
                Some(HubEvent::Connected) => return Ok(()),
                Some(HubEvent::AuthenticationFailed { code }) => {
                    return Err(HubError::AuthenticationRejected(code))
                }
                Some(event) => debug!("Waiting for connection: {:?}", event),
                None => return Err(HubError::NotRunning),
            }
        }
    }

    /// Stop the driver and release the socket
    pub async fn shutdown(mut self) {
        let _ = self.handle.send(HubCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Hub task failed: {}", e);
            }
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let _ = self.handle.send(HubCommand::Shutdown);
    }
}

/// The task that owns the engine and the socket
struct Driver<T: Transport> {
    engine: HubEngine,
    transport: T,
    credentials: Arc<dyn CredentialProvider>,
    addr: String,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    events: mpsc::UnboundedSender<HubEvent>,
    sender: Option<T::Sender>,
    receiver: Option<T::Receiver>,
}

impl<T: Transport + 'static> Driver<T> {
    async fn run(mut self) {
        loop {
            self.perform_actions().await;
            self.publish_events();

            let deadline = self.engine.poll_timeout();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(HubCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                event = next_event(&mut self.receiver) => self.handle_transport_event(event),

                _ = sleep_until(deadline) => self.engine.handle_timeout(now()),
            }
        }

        self.release().await;
        info!("Hub stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect => self.engine.connect(now()),
            HubCommand::Register {
                device,
                home,
                reply,
            } => {
                let result = self
                    .engine
                    .register_device(device, home, now())
                    .map(|light| (light.device().clone(), light.subscribe()));
                let _ = reply.send(result);
            }
            HubCommand::Deregister { device_id, reply } => {
                let _ = reply.send(self.engine.deregister_device(device_id));
            }
            HubCommand::Control { device_id, control } => {
                if let Err(e) = self.engine.control(device_id, control) {
                    warn!("Control for device {} failed: {}", device_id, e);
                }
            }
            HubCommand::Status { reply } => {
                let _ = reply.send(self.engine.status());
            }
            HubCommand::Shutdown => {}
        }
    }

    fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(packet)) => self.engine.handle_packet(&packet, now()),
            Some(TransportEvent::Error(e)) => warn!("Transport error: {}", e),
            Some(TransportEvent::Disconnected { reason }) => {
                info!("Relay connection closed: {}", reason.as_deref().unwrap_or("end of stream"));
                self.sender = None;
                self.receiver = None;
                self.engine.on_disconnect(now());
            }
            None => {
                self.sender = None;
                self.receiver = None;
                self.engine.on_disconnect(now());
            }
        }
    }

    async fn perform_actions(&mut self) {
        while let Some(action) = self.engine.poll_action() {
            match action {
                EngineAction::Open => self.open().await,
                EngineAction::Write(data) => self.write(data),
                EngineAction::Send(entry) => self.send(entry),
                EngineAction::Close => self.release().await,
            }
        }
    }

    async fn open(&mut self) {
        self.release().await;

        let credentials = match self.credentials.credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                self.engine.on_credentials_failed(e.to_string());
                return;
            }
        };

        match self.transport.connect(&self.addr).await {
            Ok((sender, receiver)) => {
                self.sender = Some(sender);
                self.receiver = Some(receiver);
                self.engine.on_open(&credentials);
            }
            Err(e) => self.engine.on_connect_failed(e.to_string(), now()),
        }
    }

    /// Writes never wait on the socket, so inbound frames keep flowing while
    /// a long queue is flushed
    fn write(&mut self, data: Bytes) {
        let Some(sender) = &self.sender else {
            warn!("No socket, dropping {} byte write", data.len());
            return;
        };
        if let Err(e) = sender.try_send(data) {
            error!("Write to relay failed: {}", e);
            self.sender = None;
            self.receiver = None;
            self.engine.on_disconnect(now());
        }
    }

    fn send(&mut self, entry: QueuedPacket) {
        let result = match &self.sender {
            Some(sender) => sender.try_send(entry.data.clone()),
            None => Err(TransportError::NotConnected),
        };
        if let Err(e) = result {
            error!("Write to relay failed: {}", e);
            self.sender = None;
            self.receiver = None;
            self.engine.on_send_failed(entry, now());
        }
    }

    async fn release(&mut self) {
        self.receiver = None;
        if let Some(sender) = self.sender.take() {
            if let Err(e) = sender.close().await {
                debug!("Close failed: {}", e);
            }
        }
    }

    fn publish_events(&mut self) {
        while let Some(event) = self.engine.poll_event() {
            // nobody listening is fine
            let _ = self.events.send(event);
        }
    }
}

async fn next_event<R: TransportReceiver>(receiver: &mut Option<R>) -> Option<TransportEvent> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
