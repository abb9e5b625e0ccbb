// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-band console commands over RCON, with a stdin fallback for
//! supervised children when RCON is disabled.

use std::sync::Arc;

use hearth_core::{ServerId, ServerStatus};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::SupervisorError;
use crate::rcon::{RconClient, RconError};
use crate::record::ServerRecord;

use super::Supervisor;

/// Commands that must go through the supervised stop path instead of the
/// console, so state transitions stay observable.
const BLOCKED: [&str; 3] = ["stop", "restart", "shutdown"];

/// First token of a command, without a leading slash, lowercased.
fn first_token(text: &str) -> String {
    text.trim()
        .trim_start_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

impl Supervisor {
    /// Run a console command on a Running server and return its response.
    ///
    /// With RCON disabled the command is written to the child's stdin
    /// (empty response); a re-adopted process has no stdin, so the call
    /// fails with the underlying RCON error.
    pub async fn command(&self, id: &ServerId, text: &str) -> Result<String, SupervisorError> {
        let token = first_token(text);
        if BLOCKED.contains(&token.as_str()) {
            return Err(SupervisorError::BlockedCommand(token));
        }

        let record = self.record(id)?;
        let status = record.status();
        if status != ServerStatus::Running {
            return Err(SupervisorError::NotRunning(status));
        }

        match self.rcon_execute(&record, text).await {
            Ok(response) => Ok(response),
            Err(SupervisorError::RconUnavailable(RconError::Disabled)) => {
                // Console fallback for supervised children
                let mut stdin = record.stdin.lock().await;
                let Some(handle) = stdin.as_mut() else {
                    return Err(SupervisorError::RconUnavailable(RconError::Disabled));
                };
                let line = format!("{}\n", text.trim_end());
                let written = async {
                    handle.write_all(line.as_bytes()).await?;
                    handle.flush().await
                }
                .await;
                match written {
                    Ok(()) => Ok(String::new()),
                    Err(e) => {
                        *stdin = None;
                        Err(SupervisorError::internal(format!("stdin write failed: {e}")))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Execute over the record's RCON session, connecting lazily. A
    /// transport failure drops the session so the next call reconnects.
    pub(crate) async fn rcon_execute(
        &self,
        record: &Arc<ServerRecord>,
        command: &str,
    ) -> Result<String, SupervisorError> {
        let settings = self
            .rcon_settings(record)
            .ok_or(SupervisorError::RconUnavailable(RconError::Disabled))?;

        let mut session = record.rcon.lock().await;
        if session.is_none() {
            debug!(server_id = %record.server_id, port = settings.port, "rcon connecting");
            *session = Some(RconClient::connect(settings.port, &settings.password).await?);
        }

        let client = match session.as_mut() {
            Some(client) => client,
            None => return Err(SupervisorError::RconUnavailable(RconError::Disconnected)),
        };
        match client.execute(command).await {
            Ok(response) => Ok(response),
            Err(e) => {
                // Reconnect lazily on the next call
                *session = None;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
