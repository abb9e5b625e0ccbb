// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup archive metadata rows.

use chrono::{DateTime, Utc};
use hearth_core::{BackupId, ServerId};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// A `backups` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackupRow {
    pub id: String,
    pub server_id: String,
    pub name: String,
    pub path: String,
    pub size_bytes: i64,
    pub backup_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl BackupRow {
    pub fn backup_id(&self) -> BackupId {
        BackupId::new(&self.id)
    }
}

/// Fields for recording a finished archive.
#[derive(Debug, Clone)]
pub struct NewBackup {
    pub id: BackupId,
    pub server_id: ServerId,
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    /// `manual` or `scheduled`.
    pub backup_type: String,
    pub status: String,
}

/// Repository for the `backups` table.
pub struct BackupRepo;

impl BackupRepo {
    pub async fn insert(pool: &SqlitePool, new: &NewBackup) -> Result<BackupRow, StorageError> {
        sqlx::query(
            "INSERT INTO backups (id, server_id, name, path, size_bytes, backup_type, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.id.as_str())
        .bind(new.server_id.as_str())
        .bind(&new.name)
        .bind(&new.path)
        .bind(new.size_bytes as i64)
        .bind(&new.backup_type)
        .bind(&new.status)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(StorageError::from_sqlx)?;

        sqlx::query_as::<_, BackupRow>("SELECT * FROM backups WHERE id = ?")
            .bind(new.id.as_str())
            .fetch_optional(pool)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Backups of a server, newest first.
    pub async fn list_for_server(
        pool: &SqlitePool,
        server_id: &ServerId,
    ) -> Result<Vec<BackupRow>, StorageError> {
        Ok(sqlx::query_as::<_, BackupRow>(
            "SELECT * FROM backups WHERE server_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(server_id.as_str())
        .fetch_all(pool)
        .await?)
    }

    /// Scheduled backups beyond the newest `keep`, oldest first: the
    /// retention pruning worklist. Manual backups never appear here.
    pub async fn scheduled_overflow(
        pool: &SqlitePool,
        server_id: &ServerId,
        keep: i64,
    ) -> Result<Vec<BackupRow>, StorageError> {
        Ok(sqlx::query_as::<_, BackupRow>(
            "SELECT * FROM backups WHERE server_id = ? AND backup_type = 'scheduled' \
             ORDER BY created_at DESC, rowid DESC LIMIT -1 OFFSET ?",
        )
        .bind(server_id.as_str())
        .bind(keep)
        .fetch_all(pool)
        .await?)
    }

    pub async fn delete(pool: &SqlitePool, id: &BackupId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM backups WHERE id = ?")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "backups_tests.rs"]
mod tests;
