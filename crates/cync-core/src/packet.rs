//! Binary packet encoding/decoding
//!
//! Cync frame format:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0:     [7:4] Packet type                                   │
//! │             [3:0] Flags (0x3 = request, 0x8 = response)         │
//! │ Byte 1-4:   Payload length (uint32 big-endian)                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Payload (length bytes, absent when length is zero)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync, Status and Connection payloads carry their own correlation id in
//! bytes 4-5, which is surfaced as [`Packet::seq`].

use crate::{Error, Result, HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Flag nibble for request frames
pub const REQUEST_FLAG: u8 = 0x3;

/// Flag bit for response/acknowledgement frames
pub const RESPONSE_FLAG: u8 = 0x8;

/// Packet type codes (upper nibble of the header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Auth,
    Sync,
    Status,
    Connection,
    Ping,
    /// Any type code this implementation does not understand
    Unknown(u8),
}

impl PacketType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => PacketType::Auth,
            4 => PacketType::Sync,
            7 => PacketType::Status,
            10 => PacketType::Connection,
            13 => PacketType::Ping,
            other => PacketType::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::Auth => 1,
            PacketType::Sync => 4,
            PacketType::Status => 7,
            PacketType::Connection => 10,
            PacketType::Ping => 13,
            PacketType::Unknown(code) => code & 0x0f,
        }
    }

    /// Whether payloads of this type embed a correlation id at bytes 4-5
    pub fn carries_sequence(self) -> bool {
        matches!(
            self,
            PacketType::Sync | PacketType::Status | PacketType::Connection
        )
    }
}

/// Device command subtypes (byte 13 of a device payload)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketSubtype {
    SetOn = 0xd0,
    SetState = 0xf0,
    Get = 0xdb,
    Paginated = 0x52,
}

impl PacketSubtype {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0xd0 => Some(PacketSubtype::SetOn),
            0xf0 => Some(PacketSubtype::SetState),
            0xdb => Some(PacketSubtype::Get),
            0x52 => Some(PacketSubtype::Paginated),
            _ => None,
        }
    }
}

/// Offset of the subtype byte inside a device payload
pub const SUBTYPE_OFFSET: usize = 13;

/// A single Cync protocol frame
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub subtype: Option<PacketSubtype>,
    pub seq: Option<u16>,
    pub is_response: bool,
    pub payload: Bytes,
}

impl Packet {
    /// Create a request packet
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self::build(packet_type, payload.into(), false)
    }

    /// Create a response (acknowledgement) packet
    pub fn response(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self::build(packet_type, payload.into(), true)
    }

    fn build(packet_type: PacketType, payload: Bytes, is_response: bool) -> Self {
        let seq = read_seq(packet_type, &payload);
        let subtype = read_subtype(packet_type, &payload);
        Self {
            packet_type,
            subtype,
            seq,
            is_response,
            payload,
        }
    }

    /// Payload length as carried in the header
    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Header byte: type in the upper nibble, request/response flag in the lower
    pub fn header_byte(&self) -> u8 {
        let flag = if self.is_response {
            RESPONSE_FLAG
        } else {
            REQUEST_FLAG
        };
        (self.packet_type.as_u8() << 4) | flag
    }

    /// Total encoded size
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u8(self.header_byte());
        buf.put_u32(self.length());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode from a 5-byte header and the payload read after it.
    ///
    /// Returns [`Error::BufferTooSmall`] when fewer payload bytes are
    /// available than the header declares; the caller keeps its bytes and
    /// retries once more data has arrived.
    pub fn decode(header: &[u8], payload: Bytes) -> Result<Self> {
        let declared = declared_length(header)?;

        if payload.len() < declared {
            return Err(Error::BufferTooSmall {
                needed: HEADER_SIZE + declared,
                have: HEADER_SIZE + payload.len(),
            });
        }
        if payload.len() > declared {
            return Err(Error::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        let byte = header[0];
        let packet_type = PacketType::from_u8(byte >> 4);
        Ok(Self::build(packet_type, payload, (byte & RESPONSE_FLAG) != 0))
    }

    /// Decode the next complete frame from a stream buffer.
    ///
    /// Returns `None` without consuming anything when the buffer does not yet
    /// hold a complete frame.
    pub fn decode_buf(buf: &mut BytesMut) -> Result<Option<Self>> {
        let total = match Self::check_complete(buf) {
            Some(total) => total,
            None => return Ok(None),
        };

        let mut frame = buf.split_to(total);
        let header = frame.split_to(HEADER_SIZE);
        Self::decode(&header, frame.freeze()).map(Some)
    }

    /// Check if buffer contains a complete frame, returning its total size
    pub fn check_complete(buf: &[u8]) -> Option<usize> {
        let declared = declared_length(buf).ok()?;
        let total = HEADER_SIZE + declared;

        if buf.len() >= total {
            Some(total)
        } else {
            None
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type)
            .field("subtype", &self.subtype)
            .field("seq", &self.seq)
            .field("is_response", &self.is_response)
            .field("payload", &hex(&self.payload))
            .finish()
    }
}

/// Read the payload length declared by a frame header
pub fn declared_length(header: &[u8]) -> Result<usize> {
    if header.len() < HEADER_SIZE {
        return Err(Error::BufferTooSmall {
            needed: HEADER_SIZE,
            have: header.len(),
        });
    }
    Ok((&header[1..HEADER_SIZE]).get_u32() as usize)
}

fn read_seq(packet_type: PacketType, payload: &[u8]) -> Option<u16> {
    if packet_type.carries_sequence() && payload.len() >= 6 {
        Some(u16::from_be_bytes([payload[4], payload[5]]))
    } else {
        None
    }
}

fn read_subtype(packet_type: PacketType, payload: &[u8]) -> Option<PacketSubtype> {
    if packet_type == PacketType::Status && payload.len() > SUBTYPE_OFFSET {
        PacketSubtype::from_u8(payload[SUBTYPE_OFFSET])
    } else {
        None
    }
}

/// Lowercase hex rendering used in packet logs
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_byte() {
        assert_eq!(Packet::new(PacketType::Auth, Bytes::new()).header_byte(), 0x13);
        assert_eq!(Packet::new(PacketType::Ping, Bytes::new()).header_byte(), 0xd3);
        assert_eq!(
            Packet::response(PacketType::Status, Bytes::new()).header_byte(),
            0x78
        );
    }

    #[test]
    fn test_seq_only_for_correlated_types() {
        let payload = Bytes::from_static(&[0, 0, 0, 1, 0x12, 0x34, 0]);
        assert_eq!(Packet::new(PacketType::Status, payload.clone()).seq, Some(0x1234));
        assert_eq!(Packet::new(PacketType::Connection, payload.clone()).seq, Some(0x1234));
        assert_eq!(Packet::new(PacketType::Sync, payload.clone()).seq, Some(0x1234));
        assert_eq!(Packet::new(PacketType::Auth, payload).seq, None);
    }

    #[test]
    fn test_check_complete() {
        let encoded = Packet::new(PacketType::Connection, vec![1u8, 2, 3, 4, 5, 6, 7]).encode();

        assert_eq!(Packet::check_complete(&encoded), Some(12));
        assert_eq!(Packet::check_complete(&encoded[..3]), None);
        assert_eq!(Packet::check_complete(&encoded[..8]), None);
    }

    #[test]
    fn test_decode_buf_waits_for_more_data() {
        let encoded = Packet::new(PacketType::Sync, vec![9u8; 10]).encode();
        let mut buf = BytesMut::from(&encoded[..7]);

        assert_eq!(Packet::decode_buf(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 7);

        buf.extend_from_slice(&encoded[7..]);
        let packet = Packet::decode_buf(&mut buf).unwrap().unwrap();
        assert_eq!(packet.packet_type, PacketType::Sync);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0x7e, 0xff]), "007eff");
    }
}
