// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server rows and their repository.

use chrono::{DateTime, Utc};
use hearth_core::{MemoryLimits, ServerId, ServerStatus, ServerType};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// A `servers` row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRow {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub mc_version: String,
    pub server_type: String,
    pub directory_path: String,
    pub port: i64,
    pub memory_min_mb: i64,
    pub memory_max_mb: i64,
    pub max_players: i64,
    pub status: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerRow {
    pub fn server_id(&self) -> ServerId {
        ServerId::new(&self.id)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus::from_db_str(&self.status)
    }

    pub fn server_type(&self) -> Result<ServerType, StorageError> {
        self.server_type
            .parse()
            .map_err(|e: hearth_core::UnknownServerType| StorageError::CorruptRow(e.to_string()))
    }

    pub fn port_u16(&self) -> u16 {
        self.port as u16
    }

    pub fn memory(&self) -> MemoryLimits {
        MemoryLimits::new(self.memory_min_mb as u32, self.memory_max_mb as u32)
    }
}

/// Fields needed to insert a server row.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub id: ServerId,
    pub name: String,
    pub owner_id: String,
    pub mc_version: String,
    pub server_type: ServerType,
    pub directory_path: String,
    pub port: u16,
    pub memory: MemoryLimits,
    pub max_players: u32,
}

/// Repository for the `servers` table.
pub struct ServerRepo;

impl ServerRepo {
    /// Insert a new row in status `stopped`. Unique-index violations
    /// (port, directory, owner+name) surface as `Conflict`.
    pub async fn insert(pool: &SqlitePool, new: &NewServer) -> Result<ServerRow, StorageError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO servers \
             (id, name, owner_id, mc_version, server_type, directory_path, port, \
              memory_min_mb, memory_max_mb, max_players, status, deleted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'stopped', 0, ?, ?)",
        )
        .bind(new.id.as_str())
        .bind(&new.name)
        .bind(&new.owner_id)
        .bind(&new.mc_version)
        .bind(new.server_type.as_str())
        .bind(&new.directory_path)
        .bind(new.port as i64)
        .bind(new.memory.min_mb as i64)
        .bind(new.memory.max_mb as i64)
        .bind(new.max_players as i64)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

        Self::fetch(pool, &new.id).await
    }

    /// Fetch a non-deleted row by id.
    pub async fn fetch(pool: &SqlitePool, id: &ServerId) -> Result<ServerRow, StorageError> {
        sqlx::query_as::<_, ServerRow>(
            "SELECT * FROM servers WHERE id = ? AND deleted = 0",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or(StorageError::NotFound)
    }

    /// All non-deleted rows.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<ServerRow>, StorageError> {
        Ok(sqlx::query_as::<_, ServerRow>(
            "SELECT * FROM servers WHERE deleted = 0 ORDER BY created_at",
        )
        .fetch_all(pool)
        .await?)
    }

    /// Non-deleted rows whose persisted status is not `stopped`:
    /// reconciler's boot worklist.
    pub async fn list_non_stopped(pool: &SqlitePool) -> Result<Vec<ServerRow>, StorageError> {
        Ok(sqlx::query_as::<_, ServerRow>(
            "SELECT * FROM servers WHERE deleted = 0 AND status != 'stopped' ORDER BY created_at",
        )
        .fetch_all(pool)
        .await?)
    }

    /// Persist a status transition.
    pub async fn update_status(
        pool: &SqlitePool,
        id: &ServerId,
        status: ServerStatus,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE servers SET status = ?, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(status.as_db_str())
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete the server and drop its schedule in one transaction.
    /// The partial unique indexes release the port and directory; backup
    /// rows are kept for later pruning of the archives themselves.
    pub async fn soft_delete(pool: &SqlitePool, id: &ServerId) -> Result<(), StorageError> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            "UPDATE servers SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        sqlx::query("DELETE FROM backup_schedules WHERE server_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO backup_schedule_logs (server_id, action, reason, created_at) \
             VALUES (?, 'deleted', 'server deleted', ?)",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Whether `name` is taken by a non-deleted server of `owner`.
    pub async fn name_taken(
        pool: &SqlitePool,
        owner_id: &str,
        name: &str,
    ) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM servers WHERE owner_id = ? AND name = ? AND deleted = 0",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Ports held by non-deleted rows, for the allocator's collision scan.
    pub async fn ports_in_use(pool: &SqlitePool) -> Result<Vec<u16>, StorageError> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT port FROM servers WHERE deleted = 0")
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|p| p as u16).collect())
    }
}

#[cfg(test)]
#[path = "servers_tests.rs"]
mod tests;
