// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous RCON client used by the supervisor to run in-band
//! commands against a running server.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::codec::{RconCodec, RconCodecError, RconPacket, RconPacketType};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// RCON failures as seen by the supervisor.
#[derive(Debug, Error)]
pub enum RconError {
    #[error("rcon is not enabled in server.properties")]
    Disabled,

    #[error("connect to {addr} failed: {source}")]
    Connect { addr: SocketAddr, source: std::io::Error },

    #[error("authentication rejected")]
    NotAuthenticated,

    #[error("call timed out")]
    Timeout,

    #[error("connection closed by server")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] RconCodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A logged-in RCON session. Created by [`RconClient::connect`]; after a
/// `Disconnected` or `Timeout` error the session is unusable and the
/// holder drops it, reconnecting lazily on the next call.
#[derive(Debug)]
pub struct RconClient {
    stream: TcpStream,
    read_buf: BytesMut,
    next_id: i32,
}

impl RconClient {
    /// Connect to `127.0.0.1:port` and authenticate.
    pub async fn connect(port: u16, password: &str) -> Result<Self, RconError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| RconError::Timeout)?
            .map_err(|source| RconError::Connect { addr, source })?;

        let mut client = Self { stream, read_buf: BytesMut::with_capacity(4096), next_id: 0 };
        client.login(password).await?;
        debug!(%addr, "rcon session established");
        Ok(client)
    }

    async fn login(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.take_id();
        let reply = self.send_and_receive(RconPacket::login(id, password)).await?;
        // Auth failure is signalled by request id -1; the reply's type
        // varies between server implementations, so only the id counts.
        if reply.id == -1 {
            return Err(RconError::NotAuthenticated);
        }
        Ok(())
    }

    /// Execute a command and return the response payload.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.take_id();
        let reply = self.send_and_receive(RconPacket::command(id, command)).await?;
        if reply.id == -1 {
            return Err(RconError::NotAuthenticated);
        }
        if reply.packet_type != RconPacketType::Response {
            debug!(?reply.packet_type, "non-response packet to command, accepting payload");
        }
        Ok(reply.payload)
    }

    fn take_id(&mut self) -> i32 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }

    /// Encode one frame, send it, and read frames until one arrives.
    async fn send_and_receive(&mut self, packet: RconPacket) -> Result<RconPacket, RconError> {
        let mut write_buf = BytesMut::new();
        RconCodec.encode(packet, &mut write_buf)?;
        self.stream.write_all(&write_buf).await?;

        loop {
            if let Some(reply) = RconCodec.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            let read = tokio::time::timeout(CALL_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| RconError::Timeout)?;
            match read {
                Ok(0) => return Err(RconError::Disconnected),
                Ok(_) => continue,
                Err(e) => return Err(RconError::Io(e)),
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
