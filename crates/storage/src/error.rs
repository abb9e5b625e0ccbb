// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error types

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("row not found")]
    NotFound,

    #[error("constraint violated: {0}")]
    Conflict(String),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    /// Classify a sqlx error, mapping unique-constraint violations to
    /// `Conflict` so callers can report them as domain conflicts
    /// (duplicate port, duplicate name) instead of opaque DB failures.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.is_unique_violation() {
                return StorageError::Conflict(db.message().to_string());
            }
        }
        StorageError::Database(err)
    }

    /// Transient errors are worth retrying: SQLite lock contention from a
    /// concurrent writer resolves within a few milliseconds.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(sqlx::Error::Database(db)) => {
                let msg = db.message().to_lowercase();
                msg.contains("locked") || msg.contains("busy")
            }
            StorageError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
