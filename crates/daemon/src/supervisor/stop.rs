// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop path: graceful console stop with signal escalation, or an
//! immediate SIGKILL when forced.

use std::sync::Arc;
use std::time::Duration;

use hearth_core::{ServerId, ServerStatus, StatusSnapshot};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::properties::ServerProperties;
use crate::record::ServerRecord;

use super::Supervisor;

/// Grace between SIGTERM and SIGKILL once the console stop has timed out.
const TERM_GRACE: Duration = Duration::from_secs(10);
/// Margin after SIGKILL for the exit watcher to observe the death.
const KILL_MARGIN: Duration = Duration::from_secs(5);

impl Supervisor {
    /// Stop a server.
    ///
    /// Stopped is a no-op returning the snapshot; Crashed is treated as
    /// the operator clearing the crash state. Otherwise the server must
    /// be Starting or Running; `force` skips the console path and goes
    /// straight to SIGKILL.
    pub async fn stop(
        &self,
        id: &ServerId,
        force: bool,
    ) -> Result<StatusSnapshot, SupervisorError> {
        let record = self.record(id)?;

        match record.status() {
            ServerStatus::Stopped => return Ok(record.snapshot()),
            ServerStatus::Crashed => {
                // Operator clear: Crashed -> Stopped
                if let Ok(transition) = record.mark_stopped(Some("operator clear".to_string())) {
                    self.emit_transition(&transition);
                    self.persist_status(id, ServerStatus::Stopped).await;
                }
                record.clear_pid_file();
                return Ok(record.snapshot());
            }
            ServerStatus::Stopping => {
                // Another stop is in flight; wait for it below
            }
            ServerStatus::Starting | ServerStatus::Running => {
                match record.begin_stop() {
                    Ok(transition) => {
                        self.emit_transition(&transition);
                        self.persist_status(id, ServerStatus::Stopping).await;

                        let supervisor = self.clone();
                        let driver_record = record.clone();
                        tokio::spawn(async move {
                            supervisor.drive_stop(driver_record, force).await;
                        });
                    }
                    // A concurrent stop or exit won the edge; treat this
                    // call as idempotent and wait alongside it.
                    Err(_) if record.status() != ServerStatus::Running => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Wait for the exit watcher to complete the transition. The
        // driver escalates through TERM and KILL inside this window.
        let budget = self.inner.config.graceful_stop_timeout + TERM_GRACE + KILL_MARGIN;
        let waiter = record.wait_for_stop();
        match tokio::time::timeout(budget, waiter).await {
            Ok(_) => Ok(record.snapshot()),
            Err(_) => {
                warn!(server_id = %id, "stop did not complete within budget");
                Ok(record.snapshot())
            }
        }
    }

    /// The stop driver: console stop, then TERM, then KILL.
    async fn drive_stop(&self, record: Arc<ServerRecord>, force: bool) {
        let Some(pid) = record.pid() else {
            // No live process; let the reconciler settle the record
            return;
        };

        if force {
            debug!(server_id = %record.server_id, pid, "forced stop, SIGKILL");
            send_signal(pid, Signal::SIGKILL);
            return;
        }

        let console_ok = self.console_stop(&record).await;
        if console_ok {
            let graceful = self.inner.config.graceful_stop_timeout;
            if self.wait_terminal(&record, graceful).await {
                return;
            }
            warn!(server_id = %record.server_id, pid, "graceful stop timed out, SIGTERM");
        } else {
            info!(server_id = %record.server_id, pid, "no console channel, SIGTERM");
        }

        send_signal(pid, Signal::SIGTERM);
        if self.wait_terminal(&record, TERM_GRACE).await {
            return;
        }

        warn!(server_id = %record.server_id, pid, "SIGTERM ignored, SIGKILL");
        send_signal(pid, Signal::SIGKILL);
    }

    /// Ask the server to save and exit: RCON `stop`, falling back to the
    /// piped stdin of a Direct child. Returns false when no channel is
    /// usable (e.g. a re-adopted process without RCON).
    async fn console_stop(&self, record: &Arc<ServerRecord>) -> bool {
        match self.rcon_execute(record, "stop").await {
            Ok(_) => {
                info!(server_id = %record.server_id, "stop sent via rcon");
                return true;
            }
            Err(e) => {
                debug!(server_id = %record.server_id, error = %e, "rcon stop unavailable");
            }
        }

        let mut stdin = record.stdin.lock().await;
        if let Some(handle) = stdin.as_mut() {
            if handle.write_all(b"stop\n").await.is_ok() && handle.flush().await.is_ok() {
                info!(server_id = %record.server_id, "stop written to stdin");
                return true;
            }
            // Broken pipe: the child is gone or its stdin was closed
            *stdin = None;
        }
        false
    }

    /// True when the record reaches Stopped/Crashed within `window`.
    async fn wait_terminal(&self, record: &Arc<ServerRecord>, window: Duration) -> bool {
        let waiter = record.wait_for_stop();
        tokio::time::timeout(window, waiter).await.is_ok()
    }

    /// Read RCON settings for a record's directory, if enabled.
    pub(crate) fn rcon_settings(
        &self,
        record: &Arc<ServerRecord>,
    ) -> Option<crate::properties::RconSettings> {
        ServerProperties::load(&record.dir.join("server.properties"))
            .ok()
            .and_then(|props| props.rcon())
    }
}

fn send_signal(pid: u32, signal: Signal) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        debug!(pid, %signal, error = %e, "signal delivery failed");
    }
}
