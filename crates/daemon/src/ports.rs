// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP port allocation for new servers.
//!
//! A port is usable when no non-deleted row holds it and a bind probe on
//! the wildcard address succeeds. The unique index on `servers.port` is
//! the backstop for races between two concurrent creates.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use hearth_storage::{ServerRepo, SqlitePool};
use tracing::debug;

use crate::error::SupervisorError;

pub const DEFAULT_PORT: u16 = 25565;

/// Whether anything on this host currently accepts `port`.
fn bind_probe(port: u16) -> bool {
    TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// Validate an explicitly requested port against rows and the probe.
pub async fn validate(pool: &SqlitePool, port: u16) -> Result<(), SupervisorError> {
    let in_use = ServerRepo::ports_in_use(pool).await?;
    if in_use.contains(&port) || !bind_probe(port) {
        return Err(SupervisorError::PortInUse(port));
    }
    Ok(())
}

/// Pick a free port: the preferred port when available, otherwise the
/// first free port scanning upward through `range`.
pub async fn allocate(
    pool: &SqlitePool,
    range: (u16, u16),
) -> Result<u16, SupervisorError> {
    let (start, end) = range;
    let taken: HashSet<u16> = ServerRepo::ports_in_use(pool).await?.into_iter().collect();

    let preferred = if (start..=end).contains(&DEFAULT_PORT) { DEFAULT_PORT } else { start };
    let candidates = std::iter::once(preferred).chain(start..=end);

    for port in candidates {
        if taken.contains(&port) {
            continue;
        }
        if bind_probe(port) {
            debug!(port, "allocated port");
            return Ok(port);
        }
    }
    Err(SupervisorError::PortInUse(end))
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
