// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DB-backed backup scheduler.
//!
//! Schedules load into an in-memory cache at startup; CRUD replaces
//! cache entries atomically under the scheduler lock. A single loop
//! wakes at a short tick and fires every enabled schedule whose window
//! has passed, consulting the supervisor for live status when
//! `only_when_running` is set. Every outcome (executed, skipped,
//! failed) lands in the schedule's audit log through the same
//! repository write path the API uses.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_core::{Clock, HearthEvent, ServerId, ServerStatus, SystemClock};
use hearth_storage::{
    NewSchedule, ScheduleAction, ScheduleRepo, ScheduleRow, ScheduleUpdate, ServerRepo,
    SqlitePool, StorageError,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup;
use crate::bus::EventBus;
use crate::error::SupervisorError;
use crate::supervisor::Supervisor;

/// The scheduler; generic over the clock so tests can drive time.
pub struct BackupScheduler<C: Clock = SystemClock> {
    supervisor: Supervisor,
    pool: SqlitePool,
    bus: EventBus,
    clock: C,
    cache: Mutex<HashMap<ServerId, ScheduleRow>>,
}

impl BackupScheduler<SystemClock> {
    pub fn new(supervisor: Supervisor) -> Arc<Self> {
        Self::with_clock(supervisor, SystemClock)
    }
}

impl<C: Clock> BackupScheduler<C> {
    pub fn with_clock(supervisor: Supervisor, clock: C) -> Arc<Self> {
        let pool = supervisor.inner.pool.clone();
        let bus = supervisor.inner.bus.clone();
        Arc::new(Self { supervisor, pool, bus, clock, cache: Mutex::new(HashMap::new()) })
    }

    /// Load all schedules into the cache. Called once at startup.
    pub async fn load(&self) -> Result<usize, SupervisorError> {
        let rows = ScheduleRepo::list(&self.pool).await?;
        let count = rows.len();
        let mut cache = self.cache.lock();
        cache.clear();
        for row in rows {
            cache.insert(row.server_id(), row);
        }
        Ok(count)
    }

    /// Scheduler loop at the configured tick, until cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let tick = self.supervisor.inner.config.scheduler_tick;
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("backup scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One pass: fire every due schedule.
    pub async fn tick(&self) {
        let now = self.clock.now_utc();
        let due: Vec<ScheduleRow> =
            self.cache.lock().values().filter(|row| row.is_due(now)).cloned().collect();

        for schedule in due {
            self.process_due(&schedule, now).await;
        }
    }

    async fn process_due(&self, schedule: &ScheduleRow, now: DateTime<Utc>) {
        let server_id = schedule.server_id();

        // Re-check against the database: CRUD or a cascade delete may
        // have outrun the cache.
        let current = match ScheduleRepo::get(&self.pool, &server_id).await {
            Ok(row) => row,
            Err(StorageError::NotFound) => {
                self.cache.lock().remove(&server_id);
                return;
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "schedule refetch failed");
                return;
            }
        };
        if !current.is_due(now) {
            self.refresh_cache(current);
            return;
        }

        let server = match ServerRepo::fetch(&self.pool, &server_id).await {
            Ok(row) => row,
            Err(StorageError::NotFound) => {
                info!(server_id = %server_id, "skip: server missing or deleted");
                self.cache.lock().remove(&server_id);
                return;
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "server fetch failed");
                return;
            }
        };

        if current.only_when_running && !self.server_running(&server_id) {
            info!(server_id = %server_id, "skip: not running");
            if let Err(e) = ScheduleRepo::mark_skipped(
                &self.pool,
                &server_id,
                now,
                ScheduleAction::Skipped,
                "not running",
            )
            .await
            {
                warn!(server_id = %server_id, error = %e, "failed to record skip");
            }
            self.reload_entry(&server_id).await;
            return;
        }

        self.execute_backup(&current, &server.directory_path, now).await;
        self.reload_entry(&server_id).await;
    }

    /// Create the archive, record it, prune retention, audit the run.
    async fn execute_backup(&self, schedule: &ScheduleRow, server_dir: &str, now: DateTime<Utc>) {
        let server_id = schedule.server_id();
        let name = backup::scheduled_name(now);
        let backups_root = self.supervisor.inner.config.backups_root.clone();

        let archived =
            backup::create_archive(&backups_root, &server_id, Path::new(server_dir), &name).await;

        match archived {
            Ok(archive) => {
                let recorded = backup::record_and_prune(
                    &self.pool,
                    &server_id,
                    &name,
                    &archive,
                    "scheduled",
                    schedule.max_backups,
                )
                .await;
                match recorded {
                    Ok(backup_id) => {
                        let reason = format!("{name} ({} bytes)", archive.size_bytes);
                        if let Err(e) =
                            ScheduleRepo::mark_executed(&self.pool, &server_id, now, &reason).await
                        {
                            warn!(server_id = %server_id, error = %e, "failed to record execution");
                        }
                        self.bus.publish(HearthEvent::BackupCompleted {
                            server_id: server_id.clone(),
                            backup_id: Some(backup_id),
                            status: "completed".to_string(),
                            size_bytes: archive.size_bytes,
                            error: None,
                        });
                        info!(server_id = %server_id, %name, "scheduled backup completed");
                    }
                    Err(e) => self.record_failure(&server_id, now, &e.to_string()).await,
                }
            }
            Err(e) => self.record_failure(&server_id, now, &e.to_string()).await,
        }
    }

    /// Failed run: advance the window (no tight retry loop), audit with
    /// the error, publish a failed event.
    async fn record_failure(&self, server_id: &ServerId, now: DateTime<Utc>, error: &str) {
        warn!(server_id = %server_id, error, "scheduled backup failed");
        if let Err(e) = ScheduleRepo::mark_skipped(
            &self.pool,
            server_id,
            now,
            ScheduleAction::Executed,
            &format!("error: {error}"),
        )
        .await
        {
            warn!(server_id = %server_id, error = %e, "failed to record backup failure");
        }
        self.bus.publish(HearthEvent::BackupCompleted {
            server_id: server_id.clone(),
            backup_id: None,
            status: "failed".to_string(),
            size_bytes: 0,
            error: Some(error.to_string()),
        });
    }

    fn server_running(&self, server_id: &ServerId) -> bool {
        self.supervisor
            .status(server_id)
            .map(|snapshot| snapshot.status == ServerStatus::Running)
            .unwrap_or(false)
    }

    async fn reload_entry(&self, server_id: &ServerId) {
        match ScheduleRepo::get(&self.pool, server_id).await {
            Ok(row) => self.refresh_cache(row),
            Err(StorageError::NotFound) => {
                self.cache.lock().remove(server_id);
            }
            Err(e) => warn!(server_id = %server_id, error = %e, "cache reload failed"),
        }
    }

    fn refresh_cache(&self, row: ScheduleRow) {
        self.cache.lock().insert(row.server_id(), row);
    }

    // -- schedule CRUD (the API layer calls through here so the cache
    //    stays coherent) --

    pub async fn create_schedule(&self, new: NewSchedule) -> Result<ScheduleRow, SupervisorError> {
        let row = ScheduleRepo::create(&self.pool, &new).await?;
        self.refresh_cache(row.clone());
        Ok(row)
    }

    pub async fn update_schedule(
        &self,
        server_id: &ServerId,
        update: ScheduleUpdate,
    ) -> Result<ScheduleRow, SupervisorError> {
        let row = ScheduleRepo::update(&self.pool, server_id, &update).await?;
        self.refresh_cache(row.clone());
        Ok(row)
    }

    pub async fn delete_schedule(
        &self,
        server_id: &ServerId,
        actor: Option<&str>,
    ) -> Result<(), SupervisorError> {
        ScheduleRepo::delete(&self.pool, server_id, actor).await?;
        self.cache.lock().remove(server_id);
        Ok(())
    }

    pub async fn get_schedule(&self, server_id: &ServerId) -> Result<ScheduleRow, SupervisorError> {
        Ok(ScheduleRepo::get(&self.pool, server_id).await?)
    }

    /// Cached view, for tests and diagnostics.
    pub fn cached(&self, server_id: &ServerId) -> Option<ScheduleRow> {
        self.cache.lock().get(server_id).cloned()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
