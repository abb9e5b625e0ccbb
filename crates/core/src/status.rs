// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-server status machine.
//!
//! Every status change observable through the supervisor must match one of
//! the edges encoded here; anything else is rejected before any side
//! effect happens.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Live status of a managed server process.
///
/// `Crashed` is in-memory only; it persists as `error` so that the
/// reconciler can distinguish an orderly `stopped` row from one that
/// needs operator attention after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    #[serde(rename = "error")]
    Crashed,
}

/// Attempted status change outside the legal transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ServerStatus,
    pub to: ServerStatus,
}

impl ServerStatus {
    /// Whether `self -> next` is a legal edge.
    pub fn can_transition_to(self, next: ServerStatus) -> bool {
        use ServerStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Stopping, Crashed)
                | (Crashed, Stopped)
        )
    }

    /// Validate an edge, returning the new status on success.
    pub fn transition_to(self, next: ServerStatus) -> Result<ServerStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }

    /// A server in one of these states owns no live tasks.
    pub fn is_terminal(self) -> bool {
        matches!(self, ServerStatus::Stopped | ServerStatus::Crashed)
    }

    /// States from which `start` is accepted.
    pub fn is_startable(self) -> bool {
        matches!(self, ServerStatus::Stopped | ServerStatus::Crashed)
    }

    /// Column value used in the `servers.status` column.
    pub fn as_db_str(self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Crashed => "error",
        }
    }

    /// Parse a `servers.status` column value. Unknown values map to
    /// `Stopped` so a corrupted row cannot wedge the reconciler.
    pub fn from_db_str(s: &str) -> ServerStatus {
        match s {
            "starting" => ServerStatus::Starting,
            "running" => ServerStatus::Running,
            "stopping" => ServerStatus::Stopping,
            "error" => ServerStatus::Crashed,
            _ => ServerStatus::Stopped,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
