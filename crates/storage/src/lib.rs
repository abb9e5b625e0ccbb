// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite persistence for the Hearth supervisor.
//!
//! Repositories take a pool reference and acquire short-lived connections
//! per operation; long-running tasks (scheduler, reconciler) never hold a
//! connection across their tick. Multi-row writes (schedule mutation plus
//! audit log append) run inside transactions.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod backups;
mod db;
mod error;
mod retry;
mod schedules;
mod servers;
#[cfg(test)]
mod test_support;

pub use backups::{BackupRepo, BackupRow, NewBackup};
pub use db::{connect, connect_memory};
pub use error::StorageError;
pub use retry::with_retry;
pub use schedules::{
    NewSchedule, ScheduleAction, ScheduleLogRow, ScheduleRepo, ScheduleRow, ScheduleUpdate,
};
pub use servers::{NewServer, ServerRepo, ServerRow};

pub use sqlx::SqlitePool;
