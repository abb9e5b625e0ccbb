// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Everything is read once into [`DaemonConfig`]; tasks receive the
//! config struct and never touch `std::env` themselves.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Daemon configuration, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Base directory for server directories.
    pub servers_root: PathBuf,
    /// Base directory for backup archives.
    pub backups_root: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Explicit java binaries by major version (8, 16, 17, 21).
    pub java_paths: Vec<(u32, PathBuf)>,
    /// Directories scanned for java binaries after the explicit paths.
    pub java_discovery_paths: Vec<PathBuf>,
    /// Window for the Done marker after a start.
    pub startup_timeout: Duration,
    /// Window for orderly exit after a graceful stop request.
    pub graceful_stop_timeout: Duration,
    /// Periodic reconciler interval.
    pub reconcile_interval: Duration,
    /// Backup scheduler tick.
    pub scheduler_tick: Duration,
    /// Per-server ring buffer capacity.
    pub log_ring_size: usize,
    /// Per-subscriber queue capacity.
    pub subscriber_queue: usize,
    /// Port allocation range (inclusive).
    pub port_range: (u16, u16),
    /// Render `enable-rcon=true` with a generated password on create.
    pub rcon_auto_enable: bool,
}

/// Configuration errors worth failing startup over.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set and no default applies")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl DaemonConfig {
    /// Load configuration from the environment. Only `SERVERS_ROOT` is
    /// required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let servers_root = PathBuf::from(
            std::env::var("SERVERS_ROOT").map_err(|_| ConfigError::Missing("SERVERS_ROOT"))?,
        );
        let backups_root = std::env::var("BACKUPS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| servers_root.join("backups"));
        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| servers_root.join("hearth.db"));

        let mut java_paths = Vec::new();
        for (major, var) in [
            (8u32, "JAVA_8_PATH"),
            (16, "JAVA_16_PATH"),
            (17, "JAVA_17_PATH"),
            (21, "JAVA_21_PATH"),
        ] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    java_paths.push((major, PathBuf::from(path)));
                }
            }
        }
        let java_discovery_paths = std::env::var("JAVA_DISCOVERY_PATHS")
            .map(|s| s.split(':').filter(|p| !p.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();

        Ok(Self {
            servers_root,
            backups_root,
            database_path,
            java_paths,
            java_discovery_paths,
            startup_timeout: secs("STARTUP_TIMEOUT_SECONDS", 180)?,
            graceful_stop_timeout: secs("GRACEFUL_STOP_TIMEOUT_SECONDS", 30)?,
            reconcile_interval: secs("RECONCILE_INTERVAL_SECONDS", 15)?,
            scheduler_tick: secs("SCHEDULER_TICK_SECONDS", 30)?,
            log_ring_size: usize_var("LOG_RING_SIZE", 500)?,
            subscriber_queue: usize_var("SUBSCRIBER_QUEUE", 128)?,
            port_range: (
                u16_var("PORT_RANGE_START", 25565)?,
                u16_var("PORT_RANGE_END", 25700)?,
            ),
            rcon_auto_enable: bool_var("RCON_AUTO_ENABLE"),
        })
    }

    /// A config rooted at `root`, with short timeouts suitable for tests.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let servers_root = root.into();
        Self {
            backups_root: servers_root.join("backups"),
            database_path: servers_root.join("hearth.db"),
            java_paths: Vec::new(),
            java_discovery_paths: Vec::new(),
            startup_timeout: Duration::from_secs(180),
            graceful_stop_timeout: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(15),
            scheduler_tick: Duration::from_secs(30),
            log_ring_size: 500,
            subscriber_queue: 128,
            port_range: (25565, 25700),
            rcon_auto_enable: false,
            servers_root,
        }
    }

    /// Directory of one server.
    pub fn server_dir(&self, server_id: &hearth_core::ServerId) -> PathBuf {
        self.servers_root.join(server_id.as_str())
    }
}

fn secs(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn usize_var(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn u16_var(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
