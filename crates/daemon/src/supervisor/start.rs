// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Start path: transition to Starting, fork the JVM, wire up the pump
//! and watchers, return without waiting for the world to load.

use hearth_core::{Clock, ServerId, ServerStatus, StatusSnapshot};
use hearth_storage::ServerRepo;
use tokio::sync::oneshot;
use tracing::info;

use crate::error::SupervisorError;
use crate::launcher::{self, LaunchSpec};
use crate::logpump::{self, PumpConfig};
use crate::{java, pidfile};

use super::Supervisor;

impl Supervisor {
    /// Start a server. Precondition: status ∈ {Stopped, Crashed}. Returns
    /// once the process is forked and the record shows Starting; the
    /// startup watcher advances it to Running on the Done marker.
    pub async fn start(&self, id: &ServerId) -> Result<StatusSnapshot, SupervisorError> {
        let record = self.record(id)?;
        let row = ServerRepo::fetch(&self.inner.pool, id).await?;

        // A pid file from a run we do not know about means an external
        // process may own the directory; refuse rather than double-start.
        if record.status().is_terminal() {
            if let Some(pid) = pidfile::read(&record.dir).unwrap_or(None) {
                if pidfile::pid_alive(pid) {
                    return Err(SupervisorError::PidFileConflict {
                        path: record.pid_file().display().to_string(),
                        reason: format!("pid {pid} is alive; reconcile before starting"),
                    });
                }
                let _ = pidfile::remove(&record.dir);
            }
        }

        let transition = record.begin_start()?;
        self.emit_transition(&transition);
        self.persist_status(id, ServerStatus::Starting).await;

        let java = match java::resolve(&self.inner.config, &row.mc_version) {
            Ok(java) => java,
            Err(e) => {
                self.abort_start(&record, "java resolution failed").await;
                return Err(e);
            }
        };

        let spec = LaunchSpec {
            java,
            memory: row.memory(),
            cwd: record.dir.clone(),
            log_path: record.log_path(),
            err_path: record.err_path(),
            strategy: self.strategy(),
            helper_bin: None,
        };

        let launched = match launcher::launch(&spec).await {
            Ok(launched) => launched,
            Err(e) => {
                self.abort_start(&record, "launch failed").await;
                return Err(e.into());
            }
        };

        record.launched(launched.pid, launched.strategy);
        *record.stdin.lock().await = launched.stdin;

        let token = record.run_token();
        let (done_tx, done_rx) = oneshot::channel();
        logpump::spawn(
            record.clone(),
            PumpConfig { seek_to_end: false, done_tx: Some(done_tx) },
            token.clone(),
        );
        self.spawn_exit_watcher(record.clone(), launched.child, token.clone());
        self.spawn_startup_watcher(record.clone(), done_rx, token);

        info!(
            server_id = %id,
            pid = launched.pid,
            strategy = %launched.strategy,
            "server starting"
        );
        Ok(record.snapshot())
    }

    /// Roll a failed launch back to Stopped through the legal
    /// Starting → Stopping → Stopped path and clear any pid debris.
    pub(crate) async fn abort_start(
        &self,
        record: &std::sync::Arc<crate::record::ServerRecord>,
        reason: &str,
    ) {
        if let Ok(t) = record.begin_stop() {
            self.emit_transition(&t);
        }
        if let Ok(t) = record.mark_stopped(Some(reason.to_string())) {
            self.emit_transition(&t);
        }
        record.clear_pid_file();
        self.persist_status(&record.server_id, ServerStatus::Stopped).await;
    }

    /// Restart: stop (graceful), then start. The first failure wins.
    pub async fn restart(&self, id: &ServerId) -> Result<StatusSnapshot, SupervisorError> {
        let status = self.record(id)?.status();
        if !status.is_terminal() {
            self.stop(id, false).await?;
            let final_status = self.wait_stopped(id).await?;
            if final_status == ServerStatus::Crashed {
                return Err(SupervisorError::Crashed {
                    exit_code: None,
                    tail: self.record(id)?.stderr_tail(),
                });
            }
        }
        self.start(id).await
    }

    pub(crate) fn now_utc(&self) -> chrono::DateTime<chrono::Utc> {
        self.inner.clock.now_utc()
    }
}
