// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events published to bus subscribers.
//!
//! Serializes with `{"type": "event:name", ...fields}` format, matching
//! what the transport layer forwards over its WebSocket frames.

use crate::id::{BackupId, ServerId};
use crate::status::ServerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single console line with its observation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

impl LogLine {
    pub fn new(line: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { line: line.into(), timestamp }
    }
}

/// Events that cross the supervisor boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HearthEvent {
    #[serde(rename = "server:status")]
    ServerStatusChanged {
        server_id: ServerId,
        old: ServerStatus,
        new: ServerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "server:log")]
    LogLine {
        server_id: ServerId,
        line: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "backup:completed")]
    BackupCompleted {
        server_id: ServerId,
        /// Absent when the archive never materialized.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backup_id: Option<BackupId>,
        status: String,
        size_bytes: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HearthEvent {
    /// Server the event belongs to, for per-server filtering.
    pub fn server_id(&self) -> &ServerId {
        match self {
            HearthEvent::ServerStatusChanged { server_id, .. }
            | HearthEvent::LogLine { server_id, .. }
            | HearthEvent::BackupCompleted { server_id, .. } => server_id,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
