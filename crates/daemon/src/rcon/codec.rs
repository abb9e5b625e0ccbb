// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame structure and the corresponding `Encoder`/`Decoder` for the
//! RCON wire protocol.
//!
//! Layout on the wire, all integers little-endian:
//!
//! ```text
//! length: i32   bytes after this field (id + type + payload + 2 NULs)
//! id:     i32   request id; -1 in an auth-failure response
//! type:   i32   3 login, 2 command, 0 response
//! payload       bytes, no interior NULs
//! 0x00 0x00     payload terminator + packet terminator
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Packet body size limit; the Minecraft server rejects larger payloads,
/// and a malformed length prefix must not make us allocate unbounded.
pub const MAX_PAYLOAD: usize = 4096;

/// Overhead inside the length field: id + type + two NULs.
const BODY_OVERHEAD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconPacketType {
    /// 3: login with the password as payload.
    Login,
    /// 2: execute a command.
    Command,
    /// 0: server response.
    Response,
}

impl RconPacketType {
    fn to_i32(self) -> i32 {
        match self {
            RconPacketType::Login => 3,
            RconPacketType::Command => 2,
            RconPacketType::Response => 0,
        }
    }

    fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            3 => Some(RconPacketType::Login),
            2 => Some(RconPacketType::Command),
            0 => Some(RconPacketType::Response),
            _ => None,
        }
    }
}

/// One RCON frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub packet_type: RconPacketType,
    pub payload: String,
}

impl RconPacket {
    pub fn login(id: i32, password: &str) -> Self {
        Self { id, packet_type: RconPacketType::Login, payload: password.to_string() }
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self { id, packet_type: RconPacketType::Command, payload: command.to_string() }
    }

    pub fn response(id: i32, body: &str) -> Self {
        Self { id, packet_type: RconPacketType::Response, payload: body.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum RconCodecError {
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("invalid packet length: {0}")]
    InvalidLength(i32),

    #[error("unknown packet type: {0}")]
    UnknownType(i32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// `tokio_util::codec` implementation for RCON frames.
#[derive(Debug, Default)]
pub struct RconCodec;

impl Encoder<RconPacket> for RconCodec {
    type Error = RconCodecError;

    fn encode(&mut self, item: RconPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload.as_bytes();
        if payload.len() > MAX_PAYLOAD {
            return Err(RconCodecError::PayloadTooLarge(payload.len()));
        }
        let length = payload.len() + BODY_OVERHEAD;
        dst.reserve(4 + length);
        dst.put_i32_le(length as i32);
        dst.put_i32_le(item.id);
        dst.put_i32_le(item.packet_type.to_i32());
        dst.put_slice(payload);
        dst.put_u8(0);
        dst.put_u8(0);
        Ok(())
    }
}

impl Decoder for RconCodec {
    type Item = RconPacket;
    type Error = RconCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let length = i32::from_le_bytes(length_bytes);

        if length < BODY_OVERHEAD as i32 || length as usize > MAX_PAYLOAD + BODY_OVERHEAD {
            return Err(RconCodecError::InvalidLength(length));
        }
        let length = length as usize;
        if src.len() < 4 + length {
            // Wait for the rest of the frame
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src.get_i32_le();
        let raw_type = src.get_i32_le();
        let payload_len = length - BODY_OVERHEAD;
        let payload = String::from_utf8_lossy(&src[..payload_len]).into_owned();
        src.advance(payload_len + 2); // payload + two NULs

        let packet_type = RconPacketType::from_i32(raw_type)
            .ok_or(RconCodecError::UnknownType(raw_type))?;
        Ok(Some(RconPacket { id, packet_type, payload }))
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
