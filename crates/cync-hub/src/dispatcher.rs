//! Inbound packet routing

use cync_core::packet::hex;
use cync_core::{command, Message, Packet, StatusRecord, StatusUpdate};
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::engine::HubEngine;

impl HubEngine {
    /// Route one framed packet from the relay
    pub fn handle_packet(&mut self, packet: &Packet, now: Instant) {
        debug!(
            "Received {:?} ({} bytes): {}",
            packet.packet_type,
            packet.length(),
            hex(&packet.payload)
        );

        let message = match Message::from_packet(packet) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed {:?} packet: {}", packet.packet_type, e);
                return;
            }
        };

        match message {
            Message::Auth(reply) => self.handle_auth(reply.code, now),
            Message::Sync(records) => {
                for record in &records {
                    self.apply_record(record);
                }
            }
            Message::Status {
                needs_ack,
                ack_prefix,
                update,
            } => {
                // acknowledge before touching any device state
                if needs_ack {
                    self.write_now(&command::status_ack(&ack_prefix));
                }
                match update {
                    StatusUpdate::Paginated(records) => {
                        for record in &records {
                            self.apply_record(record);
                        }
                    }
                    StatusUpdate::Single(record) => self.apply_record(&record),
                    StatusUpdate::Empty => {}
                }
            }
            Message::Connection { switch_id } => {
                if self.registry.by_switch(switch_id).is_some() {
                    self.pending_status.push_back(switch_id);
                    self.status_due.get_or_insert(now);
                } else {
                    trace!("Connection reply for unknown switch {}", switch_id);
                }
            }
            Message::Ping => trace!("Ping reply"),
            Message::Unknown(code) => debug!("Ignoring packet type {}", code),
        }
    }

    fn apply_record(&mut self, record: &StatusRecord) {
        let Some(light) = self.registry.by_mesh_mut(record.mesh_id) else {
            trace!("No device for mesh id {}", record.mesh_id);
            return;
        };

        let device_id = light.device().device_id;
        let changes = light.update_state(
            record.on,
            record.brightness,
            record.color_temp,
            record.rgb,
        );
        if !changes.is_empty() {
            debug!("Device {} changed: {:?}", device_id, changes);
        }
        self.characteristic_changed(device_id, changes);
    }
}
