//! Typed view of inbound packets
//!
//! Raw [`Packet`]s are turned into a [`Message`] right after framing so the
//! dispatcher never has to index into payload buffers itself.

use crate::command::ACK_LEN;
use crate::{Error, Packet, PacketSubtype, PacketType, Result};

/// Offset of the first device record in a sync payload
pub const SYNC_RECORDS_OFFSET: usize = 7;

/// Size of one device record in a sync payload
pub const SYNC_RECORD_SIZE: usize = 19;

/// Offset of the first device record in a paginated status payload
pub const PAGINATED_RECORDS_OFFSET: usize = 22;

/// Size of one device record in a paginated status payload
pub const PAGINATED_RECORD_SIZE: usize = 24;

/// Minimum payload length for a status frame to carry device data
pub const MIN_STATUS_LEN: usize = 25;

/// Minimum payload length of a single-device (Get) status frame
pub const MIN_GET_STATUS_LEN: usize = 29;

/// Result of the authentication handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthReply {
    pub code: u16,
}

impl AuthReply {
    pub fn accepted(&self) -> bool {
        self.code == 0
    }
}

/// State of one device as carried by a sync or status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    pub mesh_id: u16,
    pub on: bool,
    pub brightness: u8,
    /// `None` when the frame does not carry it (or carries zero)
    pub color_temp: Option<u8>,
    pub rgb: Option<[u8; 3]>,
}

impl StatusRecord {
    fn new(mesh_id: u8, on: u8, brightness: u8) -> Self {
        let on = on > 0;
        Self {
            mesh_id: mesh_id as u16,
            on,
            brightness: if on { brightness } else { 0 },
            color_temp: None,
            rgb: None,
        }
    }

    fn with_color_temp(mut self, color_temp: u8) -> Self {
        self.color_temp = (color_temp != 0).then_some(color_temp);
        self
    }

    fn with_rgb(mut self, rgb: [u8; 3]) -> Self {
        self.rgb = Some(rgb);
        self
    }
}

/// Device data found in a status frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Multiple fixed-size records
    Paginated(Vec<StatusRecord>),
    /// Reply to a single-device query
    Single(StatusRecord),
    /// Frame carries no device data this implementation understands
    Empty,
}

/// A decoded inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Auth(AuthReply),
    Sync(Vec<StatusRecord>),
    Status {
        /// Frame was itself a request and must be acknowledged
        needs_ack: bool,
        /// Leading payload bytes to echo back in the acknowledgement
        ack_prefix: [u8; ACK_LEN],
        update: StatusUpdate,
    },
    Connection {
        switch_id: u32,
    },
    Ping,
    Unknown(u8),
}

impl Message {
    /// Decode a framed packet into its typed form
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let payload = packet.payload.as_ref();

        match packet.packet_type {
            PacketType::Auth => {
                require(payload, 2)?;
                Ok(Message::Auth(AuthReply {
                    code: u16::from_be_bytes([payload[0], payload[1]]),
                }))
            }
            PacketType::Sync => Ok(Message::Sync(decode_sync(payload))),
            PacketType::Status => {
                let mut ack_prefix = [0u8; ACK_LEN];
                let n = payload.len().min(ACK_LEN);
                ack_prefix[..n].copy_from_slice(&payload[..n]);

                Ok(Message::Status {
                    needs_ack: !packet.is_response,
                    ack_prefix,
                    update: decode_status(payload),
                })
            }
            PacketType::Connection => {
                require(payload, 4)?;
                Ok(Message::Connection {
                    switch_id: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }
            PacketType::Ping => Ok(Message::Ping),
            PacketType::Unknown(code) => Ok(Message::Unknown(code)),
        }
    }
}

fn require(payload: &[u8], needed: usize) -> Result<()> {
    if payload.len() < needed {
        return Err(Error::BufferTooSmall {
            needed,
            have: payload.len(),
        });
    }
    Ok(())
}

/// Records start at offset 7: `{3: mesh, 4: on, 5: brightness, 6: temp}`
fn decode_sync(payload: &[u8]) -> Vec<StatusRecord> {
    payload
        .get(SYNC_RECORDS_OFFSET..)
        .unwrap_or_default()
        .chunks_exact(SYNC_RECORD_SIZE)
        .map(|r| StatusRecord::new(r[3], r[4], r[5]).with_color_temp(r[6]))
        .collect()
}

fn decode_status(payload: &[u8]) -> StatusUpdate {
    if payload.len() < MIN_STATUS_LEN {
        return StatusUpdate::Empty;
    }

    match PacketSubtype::from_u8(payload[crate::packet::SUBTYPE_OFFSET]) {
        Some(PacketSubtype::Paginated) => StatusUpdate::Paginated(
            payload[PAGINATED_RECORDS_OFFSET..]
                .chunks_exact(PAGINATED_RECORD_SIZE)
                .map(|r| {
                    StatusRecord::new(r[0], r[8], r[12])
                        .with_color_temp(r[16])
                        .with_rgb([r[20], r[21], r[22]])
                })
                .collect(),
        ),
        Some(PacketSubtype::Get) if payload.len() >= MIN_GET_STATUS_LEN => {
            StatusUpdate::Single(StatusRecord::new(payload[21], payload[27], payload[28]))
        }
        _ => StatusUpdate::Empty,
    }
}
