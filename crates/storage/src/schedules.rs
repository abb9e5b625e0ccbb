// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup schedules and their append-only audit log.
//!
//! Every mutation pairs the row change with an audit append in one
//! transaction, so the log is a faithful history of what the scheduler
//! and the API did to each schedule.

use chrono::{DateTime, Duration, Utc};
use hearth_core::{ScheduleId, ServerId};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// Bounds from the schema; validated before touching the database so the
/// caller gets a `Conflict` instead of a CHECK failure.
pub const INTERVAL_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=168;
pub const MAX_BACKUPS_RANGE: std::ops::RangeInclusive<i64> = 1..=30;

/// A `backup_schedules` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub server_id: String,
    pub interval_hours: i64,
    pub max_backups: i64,
    pub enabled: bool,
    pub only_when_running: bool,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub next_backup_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleRow {
    pub fn server_id(&self) -> ServerId {
        ServerId::new(&self.server_id)
    }

    pub fn interval(&self) -> Duration {
        Duration::hours(self.interval_hours)
    }

    /// Due when enabled and the window has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_backup_at <= now
    }
}

/// Audit actions recorded in `backup_schedule_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Created,
    Updated,
    Deleted,
    Executed,
    Skipped,
}

impl ScheduleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleAction::Created => "created",
            ScheduleAction::Updated => "updated",
            ScheduleAction::Deleted => "deleted",
            ScheduleAction::Executed => "executed",
            ScheduleAction::Skipped => "skipped",
        }
    }
}

/// A `backup_schedule_logs` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleLogRow {
    pub id: i64,
    pub server_id: String,
    pub action: String,
    pub reason: String,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub server_id: ServerId,
    pub interval_hours: i64,
    pub max_backups: i64,
    pub enabled: bool,
    pub only_when_running: bool,
    pub actor: Option<String>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub interval_hours: Option<i64>,
    pub max_backups: Option<i64>,
    pub enabled: Option<bool>,
    pub only_when_running: Option<bool>,
    pub actor: Option<String>,
}

fn validate(interval_hours: i64, max_backups: i64) -> Result<(), StorageError> {
    if !INTERVAL_HOURS_RANGE.contains(&interval_hours) {
        return Err(StorageError::Conflict(format!(
            "interval_hours out of range: {interval_hours}"
        )));
    }
    if !MAX_BACKUPS_RANGE.contains(&max_backups) {
        return Err(StorageError::Conflict(format!("max_backups out of range: {max_backups}")));
    }
    Ok(())
}

/// Repository for `backup_schedules` + `backup_schedule_logs`.
pub struct ScheduleRepo;

impl ScheduleRepo {
    /// Create a schedule; `next_backup_at` lands one interval out.
    pub async fn create(pool: &SqlitePool, new: &NewSchedule) -> Result<ScheduleRow, StorageError> {
        validate(new.interval_hours, new.max_backups)?;
        let now = Utc::now();
        let next = now + Duration::hours(new.interval_hours);

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO backup_schedules \
             (id, server_id, interval_hours, max_backups, enabled, only_when_running, \
              last_backup_at, next_backup_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)",
        )
        .bind(ScheduleId::generate().as_str())
        .bind(new.server_id.as_str())
        .bind(new.interval_hours)
        .bind(new.max_backups)
        .bind(new.enabled)
        .bind(new.only_when_running)
        .bind(next)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from_sqlx)?;

        append_log(
            &mut tx,
            &new.server_id,
            ScheduleAction::Created,
            &format!("every {}h, keep {}", new.interval_hours, new.max_backups),
            new.actor.as_deref(),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, &new.server_id).await
    }

    /// Fetch the schedule of a server.
    pub async fn get(pool: &SqlitePool, server_id: &ServerId) -> Result<ScheduleRow, StorageError> {
        sqlx::query_as::<_, ScheduleRow>("SELECT * FROM backup_schedules WHERE server_id = ?")
            .bind(server_id.as_str())
            .fetch_optional(pool)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// All schedules, for the scheduler's startup cache load.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<ScheduleRow>, StorageError> {
        Ok(sqlx::query_as::<_, ScheduleRow>(
            "SELECT * FROM backup_schedules ORDER BY created_at",
        )
        .fetch_all(pool)
        .await?)
    }

    /// Apply a partial update and append an `updated` audit row.
    pub async fn update(
        pool: &SqlitePool,
        server_id: &ServerId,
        update: &ScheduleUpdate,
    ) -> Result<ScheduleRow, StorageError> {
        let current = Self::get(pool, server_id).await?;
        let interval_hours = update.interval_hours.unwrap_or(current.interval_hours);
        let max_backups = update.max_backups.unwrap_or(current.max_backups);
        validate(interval_hours, max_backups)?;
        let enabled = update.enabled.unwrap_or(current.enabled);
        let only_when_running = update.only_when_running.unwrap_or(current.only_when_running);

        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE backup_schedules SET interval_hours = ?, max_backups = ?, enabled = ?, \
             only_when_running = ?, updated_at = ? WHERE server_id = ?",
        )
        .bind(interval_hours)
        .bind(max_backups)
        .bind(enabled)
        .bind(only_when_running)
        .bind(Utc::now())
        .bind(server_id.as_str())
        .execute(&mut *tx)
        .await?;

        append_log(
            &mut tx,
            server_id,
            ScheduleAction::Updated,
            &format!("every {interval_hours}h, keep {max_backups}, enabled={enabled}"),
            update.actor.as_deref(),
        )
        .await?;
        tx.commit().await?;

        Self::get(pool, server_id).await
    }

    /// Delete the schedule and append a `deleted` audit row.
    pub async fn delete(
        pool: &SqlitePool,
        server_id: &ServerId,
        actor: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut tx = pool.begin().await?;
        let result = sqlx::query("DELETE FROM backup_schedules WHERE server_id = ?")
            .bind(server_id.as_str())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        append_log(&mut tx, server_id, ScheduleAction::Deleted, "", actor).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record a successful run: advance both watermarks, append `executed`.
    pub async fn mark_executed(
        pool: &SqlitePool,
        server_id: &ServerId,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), StorageError> {
        let current = Self::get(pool, server_id).await?;
        let next = now + current.interval();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE backup_schedules SET last_backup_at = ?, next_backup_at = ?, updated_at = ? \
             WHERE server_id = ?",
        )
        .bind(now)
        .bind(next)
        .bind(now)
        .bind(server_id.as_str())
        .execute(&mut *tx)
        .await?;
        append_log(&mut tx, server_id, ScheduleAction::Executed, reason, None).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record a skipped or failed run: advance only `next_backup_at` so the
    /// window does not immediately re-fire.
    pub async fn mark_skipped(
        pool: &SqlitePool,
        server_id: &ServerId,
        now: DateTime<Utc>,
        action: ScheduleAction,
        reason: &str,
    ) -> Result<(), StorageError> {
        let current = Self::get(pool, server_id).await?;
        let next = now + current.interval();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE backup_schedules SET next_backup_at = ?, updated_at = ? WHERE server_id = ?",
        )
        .bind(next)
        .bind(now)
        .bind(server_id.as_str())
        .execute(&mut *tx)
        .await?;
        append_log(&mut tx, server_id, action, reason, None).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Audit rows for a server, oldest first.
    pub async fn logs(
        pool: &SqlitePool,
        server_id: &ServerId,
    ) -> Result<Vec<ScheduleLogRow>, StorageError> {
        Ok(sqlx::query_as::<_, ScheduleLogRow>(
            "SELECT * FROM backup_schedule_logs WHERE server_id = ? ORDER BY id",
        )
        .bind(server_id.as_str())
        .fetch_all(pool)
        .await?)
    }
}

async fn append_log(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    server_id: &ServerId,
    action: ScheduleAction,
    reason: &str,
    actor: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO backup_schedule_logs (server_id, action, reason, actor, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(server_id.as_str())
    .bind(action.as_str())
    .bind(reason)
    .bind(actor)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;
