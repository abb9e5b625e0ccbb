// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server domain types shared across the workspace.

use crate::id::ServerId;
use crate::status::ServerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distribution flavor of the server jar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Vanilla,
    Paper,
    Spigot,
    Forge,
    Fabric,
}

impl ServerType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Vanilla => "vanilla",
            ServerType::Paper => "paper",
            ServerType::Spigot => "spigot",
            ServerType::Forge => "forge",
            ServerType::Fabric => "fabric",
        }
    }
}

/// Unknown server type string in a request or database row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown server type: {0}")]
pub struct UnknownServerType(pub String);

impl std::str::FromStr for ServerType {
    type Err = UnknownServerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vanilla" => Ok(ServerType::Vanilla),
            "paper" => Ok(ServerType::Paper),
            "spigot" => Ok(ServerType::Spigot),
            "forge" => Ok(ServerType::Forge),
            "fabric" => Ok(ServerType::Fabric),
            other => Err(UnknownServerType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JVM heap bounds in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub min_mb: u32,
    pub max_mb: u32,
}

impl MemoryLimits {
    pub fn new(min_mb: u32, max_mb: u32) -> Self {
        Self { min_mb, max_mb }
    }
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self { min_mb: 1024, max_mb: 2048 }
    }
}

/// Parameters for creating a new server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerSpec {
    pub name: String,
    pub owner_id: String,
    pub mc_version: String,
    pub server_type: ServerType,
    /// Explicit port; `None` asks the allocator for one.
    pub port: Option<u16>,
    pub memory: MemoryLimits,
    pub max_players: u32,
}

/// How the JVM child was detached from the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchStrategy {
    /// Intermediate session leader spawned the JVM and exited; the JVM is
    /// orphaned to init and survives supervisor restarts.
    DoubleFork,
    /// Single setsid spawn; the JVM is our direct child with piped stdin.
    Direct,
    /// Process found on disk by the reconciler; no stdin, exit codes
    /// unavailable.
    Adopted,
}

impl std::fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LaunchStrategy::DoubleFork => "double-fork",
            LaunchStrategy::Direct => "direct",
            LaunchStrategy::Adopted => "adopted",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a server record, cheap to copy out of the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub server_id: ServerId,
    pub status: ServerStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub strategy: Option<LaunchStrategy>,
}

impl StatusSnapshot {
    /// Snapshot for a server with no live process.
    pub fn stopped(server_id: ServerId) -> Self {
        Self {
            server_id,
            status: ServerStatus::Stopped,
            pid: None,
            started_at: None,
            strategy: None,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
