// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minecraft RCON (Source-engine remote console) over TCP.
//!
//! The wire format is length-prefixed little-endian packets; the client
//! correlates requests and responses by a per-session monotonic id.

mod client;
mod codec;

pub use client::{RconClient, RconError, CALL_TIMEOUT, CONNECT_TIMEOUT};
pub use codec::{RconCodec, RconCodecError, RconPacket, RconPacketType, MAX_PAYLOAD};
