//! Outbound payload builders
//!
//! Device payload layout (18-byte header followed by the body):
//! ```text
//! 0-3   switch id (uint32 BE)
//! 4-5   sequence (uint16 BE)
//! 6     0x00
//! 7     0x7e
//! 8-11  padding
//! 12    0xf8
//! 13    subtype
//! 14    body length
//! 15-17 padding
//! 18..  body
//! ```

use crate::{DeviceState, Error, Packet, PacketSubtype, PacketType, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the device payload header preceding the body
pub const DEVICE_HEADER_SIZE: usize = 18;

/// Checksum base for on/off-only commands
pub const SET_ON_BASE: u32 = 429;

/// Checksum base for full-state commands
pub const SET_STATE_BASE: u32 = 496;

/// Frame delimiter used inside device bodies
pub const DELIMITER: u8 = 0x7e;

/// Number of leading payload bytes echoed in a status acknowledgement
pub const ACK_LEN: usize = 7;

/// Additive checksum over the mesh id and the state bytes of a command
pub fn checksum(base: u32, mesh_id: u16, fields: &[u8]) -> u8 {
    let sum = fields
        .iter()
        .fold(base + mesh_id as u32, |acc, b| acc + *b as u32);
    (sum % 256) as u8
}

/// Authentication payload: `[0x03][user id][0x00][len][authorize][0x00 0x00][0xb4]`
pub fn auth(user_id: u32, authorize: &str) -> Result<Packet> {
    let token = authorize.as_bytes();
    if token.len() > u8::MAX as usize {
        return Err(Error::PayloadTooLarge(token.len()));
    }

    let mut buf = BytesMut::with_capacity(token.len() + 10);
    buf.put_u8(0x03);
    buf.put_u32(user_id);
    buf.put_u8(0x00);
    buf.put_u8(token.len() as u8);
    buf.extend_from_slice(token);
    buf.put_u16(0);
    buf.put_u8(0xb4);

    Ok(Packet::new(PacketType::Auth, buf.freeze()))
}

/// Zero-length keep-alive
pub fn ping() -> Packet {
    Packet::new(PacketType::Ping, Bytes::new())
}

/// Ask the relay whether the switch behind `switch_id` is online
pub fn connection_query(switch_id: u32, seq: u16) -> Packet {
    let mut buf = BytesMut::with_capacity(7);
    buf.put_u32(switch_id);
    buf.put_u16(seq);
    buf.put_u8(0);
    Packet::new(PacketType::Connection, buf.freeze())
}

/// Acknowledge a status frame by echoing its first seven payload bytes
pub fn status_ack(payload: &[u8]) -> Packet {
    let mut ack = [0u8; ACK_LEN];
    let n = payload.len().min(ACK_LEN);
    ack[..n].copy_from_slice(&payload[..n]);
    Packet::response(PacketType::Status, Bytes::copy_from_slice(&ack))
}

/// Wrap a body in the device payload header
pub fn device_payload(
    switch_id: u32,
    seq: u16,
    subtype: PacketSubtype,
    body: &[u8],
) -> Result<Bytes> {
    if body.len() > u8::MAX as usize {
        return Err(Error::PayloadTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(DEVICE_HEADER_SIZE + body.len());
    buf.put_u32(switch_id);
    buf.put_u16(seq);
    buf.put_u8(0x00);
    buf.put_u8(DELIMITER);
    buf.put_bytes(0, 4);
    buf.put_u8(0xf8);
    buf.put_u8(subtype as u8);
    buf.put_u8(body.len() as u8);
    buf.put_bytes(0, 3);
    buf.extend_from_slice(body);
    Ok(buf.freeze())
}

/// On/off body: `[0 0 0][mesh id][0xd0][0 0][on][hash][0x7e]`
pub fn set_on_body(mesh_id: u16, on: bool) -> [u8; 11] {
    let on = on as u8;
    let [hi, lo] = mesh_id.to_be_bytes();
    let hash = checksum(SET_ON_BASE, mesh_id, &[on]);
    [
        0,
        0,
        0,
        hi,
        lo,
        PacketSubtype::SetOn as u8,
        0,
        0,
        on,
        hash,
        DELIMITER,
    ]
}

/// Full-state body: `[0 0 0][mesh id][0xf0][0 0][on][brightness][temp][r g b][hash][0x7e]`
pub fn set_state_body(mesh_id: u16, state: &DeviceState) -> [u8; 16] {
    let fields = [
        state.on as u8,
        state.brightness,
        state.color_temp,
        state.rgb[0],
        state.rgb[1],
        state.rgb[2],
    ];
    let [hi, lo] = mesh_id.to_be_bytes();
    let hash = checksum(SET_STATE_BASE, mesh_id, &fields);

    let mut body = [0u8; 16];
    body[3] = hi;
    body[4] = lo;
    body[5] = PacketSubtype::SetState as u8;
    body[8..14].copy_from_slice(&fields);
    body[14] = hash;
    body[15] = DELIMITER;
    body
}

/// Body of a paginated status request
pub const STATUS_QUERY_BODY: [u8; 6] = [0xff, 0xff, 0x00, 0x00, 0x56, DELIMITER];

pub fn set_on(switch_id: u32, seq: u16, mesh_id: u16, on: bool) -> Result<Packet> {
    let payload = device_payload(
        switch_id,
        seq,
        PacketSubtype::SetOn,
        &set_on_body(mesh_id, on),
    )?;
    Ok(Packet::new(PacketType::Status, payload))
}

pub fn set_state(switch_id: u32, seq: u16, mesh_id: u16, state: &DeviceState) -> Result<Packet> {
    let payload = device_payload(
        switch_id,
        seq,
        PacketSubtype::SetState,
        &set_state_body(mesh_id, state),
    )?;
    Ok(Packet::new(PacketType::Status, payload))
}

/// Request a paginated status dump from the switch
pub fn status_query(switch_id: u32, seq: u16) -> Result<Packet> {
    let payload = device_payload(
        switch_id,
        seq,
        PacketSubtype::Paginated,
        &STATUS_QUERY_BODY,
    )?;
    Ok(Packet::new(PacketType::Status, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_on_checksum() {
        assert_eq!(checksum(SET_ON_BASE, 500, &[1]), 162);
        let body = set_on_body(500, true);
        assert_eq!(body[9], 162);
        assert_eq!(body[10], DELIMITER);
        assert_eq!(&body[3..5], &500u16.to_be_bytes());
    }

    #[test]
    fn test_set_state_checksum() {
        let state = DeviceState {
            on: true,
            brightness: 50,
            color_temp: 20,
            rgb: [10, 20, 30],
        };
        let body = set_state_body(7, &state);
        // 496 + 7 + 1 + 50 + 20 + 60 = 634
        assert_eq!(body[14], (634 % 256) as u8);
        assert_eq!(&body[8..14], &[1, 50, 20, 10, 20, 30]);
        assert_eq!(body[5], 0xf0);
    }

    #[test]
    fn test_device_payload_layout() {
        let payload = device_payload(0x0102_0304, 0x0a0b, PacketSubtype::Get, &[0xaa]).unwrap();
        assert_eq!(payload.len(), DEVICE_HEADER_SIZE + 1);
        assert_eq!(&payload[0..4], &[1, 2, 3, 4]);
        assert_eq!(&payload[4..6], &[0x0a, 0x0b]);
        assert_eq!(payload[7], 0x7e);
        assert_eq!(payload[12], 0xf8);
        assert_eq!(payload[13], 0xdb);
        assert_eq!(payload[14], 1);
        assert_eq!(payload[18], 0xaa);
    }

    #[test]
    fn test_auth_layout() {
        let packet = auth(0x0000_beef, "abc").unwrap();
        assert_eq!(packet.packet_type, PacketType::Auth);
        assert_eq!(
            packet.payload.as_ref(),
            &[0x03, 0, 0, 0xbe, 0xef, 0, 3, b'a', b'b', b'c', 0, 0, 0xb4]
        );
    }

    #[test]
    fn test_status_ack_pads_short_payload() {
        let ack = status_ack(&[1, 2, 3]);
        assert!(ack.is_response);
        assert_eq!(ack.payload.as_ref(), &[1, 2, 3, 0, 0, 0, 0]);
    }
}
