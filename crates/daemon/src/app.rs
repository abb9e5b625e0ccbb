// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon composition root: startup, background tasks, shutdown.
//!
//! Everything the handlers need hangs off [`App`]; there are no module
//! globals. Startup order matters: lock file first (two daemons over one
//! root corrupt pid files), then the database, then record loading and
//! reconciliation, then the periodic loops.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use fs2::FileExt;
use hearth_core::ServerStatus;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::env::{ConfigError, DaemonConfig};
use crate::error::SupervisorError;
use crate::jar::JarProvider;
use crate::reconcile::Reconciler;
use crate::scheduler::BackupScheduler;
use crate::supervisor::Supervisor;

/// Startup failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] hearth_storage::StorageError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The running daemon.
pub struct App {
    pub config: DaemonConfig,
    pub supervisor: Supervisor,
    pub scheduler: Arc<BackupScheduler>,
    pub reconciler: Reconciler,
    pub bus: EventBus,
    shutdown_token: CancellationToken,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

impl App {
    /// Bring the daemon up: lock, database, records, reconciliation,
    /// scheduler. Returns once the periodic loops are running.
    pub async fn start(
        config: DaemonConfig,
        jar_provider: Arc<dyn JarProvider>,
    ) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.servers_root)?;
        std::fs::create_dir_all(&config.backups_root)?;

        // Exclusive lock before anything stateful
        let lock_path = config.servers_root.join("hearthd.pid");
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(AppError::LockFailed)?;
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        let pool = hearth_storage::connect(&config.database_path).await?;
        let bus = EventBus::new(config.subscriber_queue);
        let supervisor = Supervisor::new(config.clone(), pool, bus.clone(), jar_provider);

        let loaded = supervisor.load_records().await?;
        info!(servers = loaded, "records loaded");

        let reconciler = Reconciler::new(supervisor.clone());
        let adopted = reconciler.reconcile_on_boot().await?;
        if adopted > 0 {
            info!(adopted, "re-adopted surviving servers");
        }

        let scheduler = BackupScheduler::new(supervisor.clone());
        let schedules = scheduler.load().await?;
        info!(schedules, "backup schedules loaded");

        let shutdown_token = CancellationToken::new();
        tokio::spawn(reconciler.clone().run(shutdown_token.child_token()));
        tokio::spawn(scheduler.clone().run(shutdown_token.child_token()));

        info!(root = %config.servers_root.display(), "hearthd ready");
        Ok(Self {
            config,
            supervisor,
            scheduler,
            reconciler,
            bus,
            shutdown_token,
            lock_file,
        })
    }

    /// Token cancelled when shutdown begins; transport layers select on
    /// it to stop accepting work.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Shut the daemon down.
    ///
    /// Detached JVMs are intentionally left running so they survive the
    /// restart; the next boot's reconciler re-adopts them. With
    /// `stop_all` every live server is gracefully stopped first.
    pub async fn shutdown(&self, stop_all: bool) {
        info!(stop_all, "shutting down");
        self.shutdown_token.cancel();

        if stop_all {
            let records = self.supervisor_records();
            for id in records {
                match self.supervisor.stop(&id, false).await {
                    Ok(snapshot) => {
                        info!(server_id = %id, status = %snapshot.status, "server stopped")
                    }
                    Err(SupervisorError::IllegalTransition(_)) => {}
                    Err(e) => warn!(server_id = %id, error = %e, "stop failed during shutdown"),
                }
            }
        } else {
            // Statuses are already persisted per transition; the next
            // boot's reconciler picks the processes back up.
            for id in self.supervisor_records() {
                if let Ok(snapshot) = self.supervisor.status(&id) {
                    if snapshot.status != ServerStatus::Stopped {
                        info!(
                            server_id = %id,
                            status = %snapshot.status,
                            "leaving server for re-adoption"
                        );
                    }
                }
            }
        }

        // Stop the per-record tasks either way; processes are unaffected.
        self.supervisor.detach_all();

        let subscribers = self.bus.subscriber_count();
        if subscribers > 0 {
            info!(subscribers, "flushing event subscribers");
        }

        let lock_path = self.config.servers_root.join("hearthd.pid");
        if let Err(e) = std::fs::remove_file(&lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to remove daemon pid file");
            }
        }
        info!("shutdown complete");
    }

    fn supervisor_records(&self) -> Vec<hearth_core::ServerId> {
        self.supervisor
            .all_records()
            .into_iter()
            .map(|record| record.server_id.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
