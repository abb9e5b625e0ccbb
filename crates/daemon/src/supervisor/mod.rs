// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The server lifecycle supervisor.
//!
//! Owns the `{server_id -> ServerRecord}` map and orchestrates
//! create/start/stop/restart/command. Per-server transitions serialize on
//! the record's own mutex; the global map lock is held only to look up or
//! insert records. Operations live one file per concern, mirroring the
//! record lifecycle: `create`, `start`, `stop`, `command`, `watch`.

mod command;
mod create;
mod start;
mod stop;
mod watch;

pub use watch::ProcessExitEvent;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::{
    LaunchStrategy, LogLine, ServerId, ServerStatus, StatusSnapshot, SystemClock,
};
use hearth_storage::{ServerRepo, ServerRow, SqlitePool};
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch as watch_ch};
use tracing::debug;

use crate::bus::EventBus;
use crate::env::DaemonConfig;
use crate::error::SupervisorError;
use crate::jar::JarProvider;
use crate::record::{ServerRecord, Transition};

/// Cloneable supervisor handle.
#[derive(Clone)]
pub struct Supervisor {
    pub(crate) inner: Arc<SupervisorInner>,
}

pub(crate) struct SupervisorInner {
    pub config: DaemonConfig,
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub jar_provider: Arc<dyn JarProvider>,
    pub clock: SystemClock,
    /// Detachment preference for new launches.
    strategy: parking_lot::Mutex<LaunchStrategy>,
    records: RwLock<HashMap<ServerId, Arc<ServerRecord>>>,
}

impl Supervisor {
    pub fn new(
        config: DaemonConfig,
        pool: SqlitePool,
        bus: EventBus,
        jar_provider: Arc<dyn JarProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                pool,
                bus,
                jar_provider,
                clock: SystemClock,
                strategy: parking_lot::Mutex::new(LaunchStrategy::DoubleFork),
                records: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Override the launch strategy (the integration harness runs servers
    /// as direct children so it can drive stdin and reap exits).
    pub fn set_strategy(&self, strategy: LaunchStrategy) {
        *self.inner.strategy.lock() = strategy;
    }

    pub(crate) fn strategy(&self) -> LaunchStrategy {
        *self.inner.strategy.lock()
    }

    // -- registry --

    /// Look up a live record.
    pub(crate) fn record(&self, id: &ServerId) -> Result<Arc<ServerRecord>, SupervisorError> {
        self.inner
            .records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    /// Insert a record, replacing any existing one (reconciler adoption,
    /// create). Returns the inserted record.
    pub(crate) fn insert_record(
        &self,
        id: ServerId,
        dir: PathBuf,
        initial: ServerStatus,
    ) -> Arc<ServerRecord> {
        let record = ServerRecord::new(
            id.clone(),
            dir,
            initial,
            self.inner.config.log_ring_size,
            self.inner.config.subscriber_queue,
        );
        self.inner.records.write().insert(id, record.clone());
        record
    }

    /// Ensure a record exists for a persisted row, creating it Stopped.
    pub(crate) fn ensure_record(&self, row: &ServerRow) -> Arc<ServerRecord> {
        let id = row.server_id();
        if let Some(existing) = self.inner.records.read().get(&id) {
            return existing.clone();
        }
        self.insert_record(id, PathBuf::from(&row.directory_path), ServerStatus::Stopped)
    }

    pub(crate) fn remove_record(&self, id: &ServerId) {
        self.inner.records.write().remove(id);
    }

    /// Snapshot of all live records (reconciler scan).
    pub(crate) fn all_records(&self) -> Vec<Arc<ServerRecord>> {
        self.inner.records.read().values().cloned().collect()
    }

    // -- reads --

    /// Point-in-time status; does not touch the database.
    pub fn status(&self, id: &ServerId) -> Result<StatusSnapshot, SupervisorError> {
        Ok(self.record(id)?.snapshot())
    }

    /// Last `n` ring-buffered log lines, oldest first.
    pub fn tail(&self, id: &ServerId, n: usize) -> Result<Vec<String>, SupervisorError> {
        Ok(self.record(id)?.tail(n))
    }

    /// Lossy (drop-oldest) per-server log stream.
    pub fn subscribe_logs(
        &self,
        id: &ServerId,
    ) -> Result<broadcast::Receiver<LogLine>, SupervisorError> {
        Ok(self.record(id)?.subscribe_logs())
    }

    /// Coalescing (latest-wins) per-server status stream.
    pub fn subscribe_status(
        &self,
        id: &ServerId,
    ) -> Result<watch_ch::Receiver<StatusSnapshot>, SupervisorError> {
        Ok(self.record(id)?.subscribe_status())
    }

    /// Block until the current start attempt resolves to Running or
    /// Crashed.
    pub async fn wait_startup(&self, id: &ServerId) -> Result<ServerStatus, SupervisorError> {
        let waiter = self.record(id)?.wait_for_startup();
        waiter
            .await
            .map_err(|_| SupervisorError::internal("record torn down while waiting for startup"))
    }

    /// Block until the server reaches Stopped or Crashed.
    pub async fn wait_stopped(&self, id: &ServerId) -> Result<ServerStatus, SupervisorError> {
        let waiter = self.record(id)?.wait_for_stop();
        waiter
            .await
            .map_err(|_| SupervisorError::internal("record torn down while waiting for stop"))
    }

    // -- lifecycle helpers shared by the op files --

    /// Publish a transition on the bus.
    pub(crate) fn emit_transition(&self, transition: &Transition) {
        debug!(
            server_id = %transition.snapshot.server_id,
            old = %transition.old,
            new = %transition.new,
            reason = transition.reason.as_deref().unwrap_or(""),
            "status changed"
        );
        self.inner.bus.publish(hearth_core::HearthEvent::ServerStatusChanged {
            server_id: transition.snapshot.server_id.clone(),
            old: transition.old,
            new: transition.new,
            reason: transition.reason.clone(),
        });
    }

    /// Persist a status change, retrying transient database errors.
    pub(crate) async fn persist_status(&self, id: &ServerId, status: ServerStatus) {
        let pool = self.inner.pool.clone();
        let result = hearth_storage::with_retry("persist-status", || {
            let pool = pool.clone();
            let id = id.clone();
            async move { ServerRepo::update_status(&pool, &id, status).await }
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(server_id = %id, %status, error = %e, "failed to persist status");
        }
    }

    /// Soft-delete a terminal server: record removed, row hidden, port
    /// released. The directory is kept for operator inspection.
    pub async fn delete(&self, id: &ServerId) -> Result<(), SupervisorError> {
        let record = self.record(id)?;
        let status = record.status();
        if !status.is_terminal() {
            return Err(SupervisorError::internal(format!(
                "cannot delete server while {status}; stop it first"
            )));
        }
        ServerRepo::soft_delete(&self.inner.pool, id).await?;
        self.remove_record(id);
        Ok(())
    }

    /// Cancel every record's pump and watcher tasks without touching the
    /// processes. Daemon shutdown calls this; the JVMs keep running and
    /// the next boot's reconciler re-adopts them.
    pub fn detach_all(&self) {
        for record in self.all_records() {
            record.run_token().cancel();
        }
    }

    /// Load every persisted server into the record map (daemon startup).
    pub async fn load_records(&self) -> Result<usize, SupervisorError> {
        let rows = ServerRepo::list(&self.inner.pool).await?;
        let count = rows.len();
        for row in &rows {
            self.ensure_record(row);
        }
        Ok(count)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
