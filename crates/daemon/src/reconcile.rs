// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State reconciliation: make in-memory records agree with the pid files
//! on disk and the OS process table.
//!
//! Runs once at daemon startup (re-adopting JVMs that survived a
//! supervisor restart) and then periodically, catching processes that
//! died without their exit watcher firing and pid files that appeared
//! for servers the supervisor believes are Stopped.

use std::path::Path;
use std::sync::Arc;

use hearth_core::{ServerStatus, StatusSnapshot};
use hearth_storage::{ServerRepo, ServerRow};
use sysinfo::{ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::logpump::{self, PumpConfig};
use crate::pidfile;
use crate::record::ServerRecord;
use crate::supervisor::Supervisor;

/// Reconciler over a supervisor's record map.
#[derive(Clone)]
pub struct Reconciler {
    supervisor: Supervisor,
}

/// Outcome of one reconciliation decision, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Live process verified and re-adopted.
    Adopted { pid: u32 },
    /// Row said live, nothing on disk or in the process table.
    MarkedStopped { reason: String },
    /// Record and world agree; nothing to do.
    Clean,
}

impl Reconciler {
    pub fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    /// Boot pass: walk persisted rows whose last status is not Stopped
    /// and either re-adopt the process or settle the row to Stopped.
    pub async fn reconcile_on_boot(&self) -> Result<usize, crate::error::SupervisorError> {
        let rows = ServerRepo::list_non_stopped(&self.supervisor.inner.pool).await?;
        if !rows.is_empty() {
            info!("reconciling {} non-stopped server(s) from last run", rows.len());
        }

        let mut adopted = 0;
        for row in &rows {
            match self.reconcile_row(row).await {
                ReconcileOutcome::Adopted { pid } => {
                    adopted += 1;
                    info!(server_id = %row.id, pid, "re-adopted running server");
                }
                ReconcileOutcome::MarkedStopped { reason } => {
                    info!(server_id = %row.id, %reason, "marked stopped during reconciliation");
                }
                ReconcileOutcome::Clean => {}
            }
        }
        Ok(adopted)
    }

    /// Decide one row's fate at boot.
    async fn reconcile_row(&self, row: &ServerRow) -> ReconcileOutcome {
        let id = row.server_id();
        let dir = Path::new(&row.directory_path);

        let pid = match pidfile::read(dir) {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                self.settle_stopped(row, "external-exit: no pid file").await;
                return ReconcileOutcome::MarkedStopped {
                    reason: "external-exit: no pid file".to_string(),
                };
            }
            Err(e) => {
                warn!(server_id = %id, error = %e, "unreadable pid file, clearing");
                let _ = pidfile::remove(dir);
                self.settle_stopped(row, "external-exit: corrupt pid file").await;
                return ReconcileOutcome::MarkedStopped {
                    reason: "external-exit: corrupt pid file".to_string(),
                };
            }
        };

        if pidfile::pid_alive(pid) && process_matches(pid, dir) {
            self.adopt(row, pid).await;
            ReconcileOutcome::Adopted { pid }
        } else {
            // Dead, or a recycled pid belonging to someone else
            let _ = pidfile::remove(dir);
            self.settle_stopped(row, "external-exit").await;
            ReconcileOutcome::MarkedStopped { reason: "external-exit".to_string() }
        }
    }

    /// Materialize a record in Running and restart its tasks: pump from
    /// EOF, liveness-polling exit watcher. RCON reconnects lazily on the
    /// first command.
    async fn adopt(&self, row: &ServerRow, pid: u32) {
        let supervisor = &self.supervisor;
        let id = row.server_id();
        let record = supervisor.insert_record(
            id.clone(),
            row.directory_path.clone().into(),
            ServerStatus::Running,
        );
        record.adopt(pid, None);

        let token = record.run_token();
        logpump::spawn(
            record.clone(),
            PumpConfig { seek_to_end: true, done_tx: None },
            token.clone(),
        );
        supervisor.spawn_exit_watcher(record.clone(), None, token);

        if row.status() != ServerStatus::Running {
            supervisor.persist_status(&id, ServerStatus::Running).await;
        }
        supervisor.inner.bus.publish(hearth_core::HearthEvent::ServerStatusChanged {
            server_id: id,
            old: row.status(),
            new: ServerStatus::Running,
            reason: Some("adopted".to_string()),
        });
    }

    /// Persist Stopped and ensure the in-memory record (if any) agrees.
    async fn settle_stopped(&self, row: &ServerRow, reason: &str) {
        let id = row.server_id();
        self.supervisor.persist_status(&id, ServerStatus::Stopped).await;
        self.supervisor.inner.bus.publish(hearth_core::HearthEvent::ServerStatusChanged {
            server_id: id.clone(),
            old: row.status(),
            new: ServerStatus::Stopped,
            reason: Some(reason.to_string()),
        });
        // Records exist only after load_records/adoption; leave a fresh
        // Stopped record in place either way.
        self.supervisor.insert_record(
            id,
            row.directory_path.clone().into(),
            ServerStatus::Stopped,
        );
    }

    /// One periodic pass over the live record map.
    pub async fn reconcile_tick(&self) {
        for record in self.supervisor.all_records() {
            self.reconcile_record(&record).await;
        }
    }

    async fn reconcile_record(&self, record: &Arc<ServerRecord>) {
        let snapshot: StatusSnapshot = record.snapshot();
        match snapshot.status {
            ServerStatus::Starting | ServerStatus::Running | ServerStatus::Stopping => {
                // Detect a death the exit watcher missed (e.g. watcher
                // lost across a supervisor restart)
                if let Some(pid) = snapshot.pid {
                    if !pidfile::pid_alive(pid) {
                        warn!(
                            server_id = %record.server_id,
                            pid,
                            "process vanished without exit event"
                        );
                        self.supervisor.handle_process_exit(record, None).await;
                    }
                }
            }
            ServerStatus::Stopped => {
                // An operator may have started the server outside the
                // supervisor; adopt it if its pid file checks out.
                if let Ok(Some(pid)) = pidfile::read(&record.dir) {
                    if pidfile::pid_alive(pid) && process_matches(pid, &record.dir) {
                        self.adopt_external(record, pid).await;
                    } else {
                        let _ = pidfile::remove(&record.dir);
                    }
                }
            }
            ServerStatus::Crashed => {}
        }
    }

    /// Stopped record with a live external process: walk it through the
    /// legal Stopped → Starting → Running edges and attach tasks.
    async fn adopt_external(&self, record: &Arc<ServerRecord>, pid: u32) {
        let supervisor = &self.supervisor;
        info!(server_id = %record.server_id, pid, "adopting externally started process");

        let Ok(t) = record.begin_start() else { return };
        supervisor.emit_transition(&t);
        record.adopt(pid, None);
        match record.mark_running(supervisor.now_utc(), Some("adopted".to_string())) {
            Ok(t) => supervisor.emit_transition(&t),
            Err(_) => return,
        }
        supervisor.persist_status(&record.server_id, ServerStatus::Running).await;

        let token = record.run_token();
        logpump::spawn(
            record.clone(),
            PumpConfig { seek_to_end: true, done_tx: None },
            token.clone(),
        );
        supervisor.spawn_exit_watcher(record.clone(), None, token);
    }

    /// Periodic loop at the configured interval, until cancelled.
    pub async fn run(self, token: CancellationToken) {
        let interval = self.supervisor.inner.config.reconcile_interval;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick duplicates the boot pass; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.reconcile_tick().await;
                }
            }
        }
    }
}

/// Verify that `pid` looks like the JVM of `server_dir`: its command line
/// references `server.jar` and either its cwd is the server directory or
/// the directory appears in the command line. Guards against recycled
/// pids pointing at unrelated processes.
fn process_matches(pid: u32, server_dir: &Path) -> bool {
    let mut system = System::new();
    let sys_pid = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    let Some(process) = system.process(sys_pid) else {
        return false;
    };

    let cmd_parts: Vec<String> =
        process.cmd().iter().map(|part| part.to_string_lossy().into_owned()).collect();
    let cmdline = cmd_parts.join(" ");
    let dir_text = server_dir.display().to_string();

    let references_jar = cmdline.contains("server.jar");
    let references_dir = process.cwd().map(|cwd| cwd == server_dir).unwrap_or(false)
        || cmdline.contains(&dir_text);
    references_jar && references_dir
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
