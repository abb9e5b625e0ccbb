// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background watchers owned by a running server record.
//!
//! The exit watcher observes process death (reaping Direct children,
//! polling detached pids) and drives the terminal transition. The
//! startup watcher resolves Starting → Running on the Done marker or the
//! startup timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hearth_core::ServerStatus;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pidfile;
use crate::record::{file_tail, ServerRecord};

use super::Supervisor;

/// Detached pids are polled at this cadence.
const EXIT_POLL: Duration = Duration::from_secs(1);

/// A process death as observed by a watcher. `exit_code` is present only
/// for reaped Direct children; a detached JVM's code is lost to init.
#[derive(Debug, Clone)]
pub struct ProcessExitEvent {
    pub pid: u32,
    pub exit_code: Option<i32>,
    pub observed_at: DateTime<Utc>,
    /// Captured from `server_error.log` at observation time.
    pub stderr_tail: Vec<String>,
}

impl Supervisor {
    /// Watch for process exit. Direct children are reaped for their exit
    /// code; detached processes are liveness-polled (no code available).
    pub(crate) fn spawn_exit_watcher(
        &self,
        record: Arc<ServerRecord>,
        child: Option<Child>,
        token: CancellationToken,
    ) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let Some(pid) = record.pid() else { return };
            let exit_code = match child {
                Some(mut child) => {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        status = child.wait() => match status {
                            Ok(status) => status.code(),
                            Err(e) => {
                                warn!(server_id = %record.server_id, error = %e, "wait failed");
                                None
                            }
                        },
                    }
                }
                None => {
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = tokio::time::sleep(EXIT_POLL) => {
                                if !pidfile::pid_alive(pid) {
                                    break;
                                }
                            }
                        }
                    }
                    None
                }
            };
            let event = ProcessExitEvent {
                pid,
                exit_code,
                observed_at: supervisor.now_utc(),
                stderr_tail: file_tail(&record.err_path(), 20),
            };
            supervisor.handle_exit_event(&record, event).await;
        });
    }

    /// Resolve the startup phase: Done marker → Running; timeout with a
    /// live process → Running with a startup-timeout warning; anything
    /// else is the exit watcher's business.
    pub(crate) fn spawn_startup_watcher(
        &self,
        record: Arc<ServerRecord>,
        done_rx: oneshot::Receiver<()>,
        token: CancellationToken,
    ) {
        let supervisor = self.clone();
        let timeout = supervisor.inner.config.startup_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = done_rx => {
                    if result.is_ok() {
                        supervisor.settle_running(&record, None).await;
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    let pid_alive = record.pid().map(pidfile::pid_alive).unwrap_or(false);
                    if pid_alive {
                        warn!(
                            server_id = %record.server_id,
                            timeout_secs = timeout.as_secs(),
                            "no Done marker within startup window, assuming started"
                        );
                        supervisor.settle_running(&record, Some("startup-timeout".to_string())).await;
                    }
                }
            }
        });
    }

    async fn settle_running(&self, record: &Arc<ServerRecord>, reason: Option<String>) {
        let now = self.now_utc();
        // A failed edge means a crash or stop won the race; nothing to do.
        if let Ok(transition) = record.mark_running(now, reason) {
            self.emit_transition(&transition);
            self.persist_status(&record.server_id, ServerStatus::Running).await;
            info!(server_id = %record.server_id, "server running");
        }
    }

    /// Reconciler-facing entry: an exit observed without a Child handle.
    pub(crate) async fn handle_process_exit(
        &self,
        record: &Arc<ServerRecord>,
        exit_code: Option<i32>,
    ) {
        let event = ProcessExitEvent {
            pid: record.pid().unwrap_or_default(),
            exit_code,
            observed_at: self.now_utc(),
            stderr_tail: file_tail(&record.err_path(), 20),
        };
        self.handle_exit_event(record, event).await;
    }

    /// Classify a process exit by the status it interrupts and complete
    /// the transition. Idempotent: a second observer of the same exit
    /// finds the record already terminal.
    pub(crate) async fn handle_exit_event(
        &self,
        record: &Arc<ServerRecord>,
        event: ProcessExitEvent,
    ) {
        // Drop the console channels before transitioning; both are dead.
        *record.rcon.lock().await = None;
        *record.stdin.lock().await = None;

        let exit_code = event.exit_code;
        if !event.stderr_tail.is_empty() {
            record.set_stderr_tail(event.stderr_tail.clone());
        }

        let status = record.status();
        let result = match status {
            ServerStatus::Stopping => {
                if exit_code.map(|code| code != 0).unwrap_or(false) {
                    record.mark_crashed(format!(
                        "non-zero exit during stop (code {})",
                        exit_code.unwrap_or(-1)
                    ))
                } else {
                    record.mark_stopped(exit_code.map(|c| format!("exit code {c}")))
                }
            }
            ServerStatus::Starting => record.mark_crashed(match exit_code {
                Some(code) => format!("process exited before startup finished (code {code})"),
                None => "process exited before startup finished".to_string(),
            }),
            ServerStatus::Running => record.mark_crashed(match exit_code {
                Some(code) => format!("unexpected exit (code {code})"),
                None => "unexpected exit".to_string(),
            }),
            // Already terminal: the transition was completed elsewhere
            ServerStatus::Stopped | ServerStatus::Crashed => return,
        };

        match result {
            Ok(transition) => {
                record.clear_pid_file();
                let persisted = transition.new;
                self.emit_transition(&transition);
                self.persist_status(&record.server_id, persisted).await;
                info!(
                    server_id = %record.server_id,
                    from = %status,
                    to = %persisted,
                    exit_code = ?exit_code,
                    observed_at = %event.observed_at,
                    "process exit handled"
                );
            }
            Err(e) => {
                // Another task won the transition race
                tracing::debug!(server_id = %record.server_id, error = %e, "exit already handled");
            }
        }
    }
}
