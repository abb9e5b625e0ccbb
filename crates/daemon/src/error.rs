// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed failure kinds surfaced by the supervisor.
//!
//! The transport layer translates these to status codes; nothing in this
//! crate converts them back into panics or stringly-typed errors.

use hearth_core::{ServerStatus, TransitionError};
use thiserror::Error;

use crate::launcher::LaunchError;
use crate::rcon::RconError;

/// Errors returned by supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("server not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("launch failed: {0}")]
    LaunchFailed(#[from] LaunchError),

    #[error("startup timed out after {seconds}s, process still alive")]
    StartupTimedOut { seconds: u64 },

    #[error("server crashed (exit code {exit_code:?})")]
    Crashed { exit_code: Option<i32>, tail: Vec<String> },

    #[error("rcon unavailable: {0}")]
    RconUnavailable(#[from] RconError),

    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("port {0} is already in use")]
    PortInUse(u16),

    #[error("stale pid file at {path}: {reason}")]
    PidFileConflict { path: String, reason: String },

    #[error("no java binary satisfies minecraft {mc_version} (needs java {required}+)")]
    JavaNotFound { mc_version: String, required: u32 },

    #[error("command '{0}' must go through the supervised stop path")]
    BlockedCommand(String),

    #[error("server is {0}, expected running")]
    NotRunning(ServerStatus),

    #[error("jar provisioning failed: {0}")]
    Jar(#[from] crate::jar::JarError),

    #[error("storage error: {0}")]
    Storage(#[from] hearth_storage::StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    pub fn internal(msg: impl Into<String>) -> Self {
        SupervisorError::Internal(msg.into())
    }

    pub fn from_io(e: std::io::Error) -> Self {
        SupervisorError::Internal(format!("io: {e}"))
    }
}
