// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `server.properties` parsing and rendering.
//!
//! The Minecraft format is `key=value` per line with `#` comments; files
//! written by Windows tools carry CRLF line endings, which are tolerated
//! on read and never produced on write.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Parsed key/value view of a properties file. Keys keep insertion-
/// independent (sorted) order so renders are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProperties {
    entries: BTreeMap<String, String>,
}

/// RCON settings extracted from a properties file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    pub port: u16,
    pub password: String,
}

impl ServerProperties {
    /// Parse properties text. Unparseable lines are skipped rather than
    /// failing the whole file; the JVM does the same.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true"))
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// RCON connection settings, present only when `enable-rcon` is true
    /// and a password is configured.
    pub fn rcon(&self) -> Option<RconSettings> {
        if !self.get_bool("enable-rcon") {
            return None;
        }
        let port = self.get_u16("rcon.port")?;
        let password = self.get("rcon.password")?.to_string();
        if password.is_empty() {
            return None;
        }
        Some(RconSettings { port, password })
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# Minecraft server properties\n");
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.render())
    }
}

/// Default properties for a freshly created server.
pub fn defaults(port: u16, max_players: u32) -> ServerProperties {
    let mut props = ServerProperties::default();
    props
        .set("server-port", port.to_string())
        .set("max-players", max_players.to_string())
        .set("enable-rcon", "false")
        .set("motd", "A Minecraft Server")
        .set("online-mode", "true")
        .set("white-list", "false");
    props
}

/// Enable RCON on port `server_port + 10` with the given password.
pub fn enable_rcon(props: &mut ServerProperties, server_port: u16, password: &str) {
    let rcon_port = server_port.saturating_add(10);
    props
        .set("enable-rcon", "true")
        .set("rcon.port", rcon_port.to_string())
        .set("rcon.password", password);
}

/// The eula.txt content the JVM expects before it will boot.
pub const EULA_ACCEPTED: &str = "eula=true\n";

#[cfg(test)]
#[path = "properties_tests.rs"]
mod tests;
