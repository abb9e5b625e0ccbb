// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup archive creation and retention pruning.
//!
//! Archives are zstd-compressed tarballs of the server directory, written
//! under `<backups_root>/<server_id>/`. Pid files and the error log are
//! skipped: they describe the process, not the world.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hearth_core::{BackupId, ServerId};
use hearth_storage::{BackupRepo, NewBackup, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::pidfile::PID_FILE_NAME;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("server directory missing: {0}")]
    MissingDirectory(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] hearth_storage::StorageError),

    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A finished archive on disk.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Create `<backups_root>/<server_id>/<name>.tar.zst` from `server_dir`.
/// The tar walk and compression run on a blocking thread; the supervisor's
/// critical path never touches this.
pub async fn create_archive(
    backups_root: &Path,
    server_id: &ServerId,
    server_dir: &Path,
    name: &str,
) -> Result<ArchiveResult, BackupError> {
    if !server_dir.is_dir() {
        return Err(BackupError::MissingDirectory(server_dir.to_path_buf()));
    }
    let dest_dir = backups_root.join(server_id.as_str());
    std::fs::create_dir_all(&dest_dir)?;
    let dest = dest_dir.join(format!("{name}.tar.zst"));

    let src = server_dir.to_path_buf();
    let dest_clone = dest.clone();
    let size_bytes = tokio::task::spawn_blocking(move || -> Result<u64, std::io::Error> {
        let file = std::fs::File::create(&dest_clone)?;
        let encoder = zstd::stream::write::Encoder::new(file, 3)?.auto_finish();
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        append_dir_filtered(&mut builder, &src)?;
        builder.into_inner()?; // flush tar + zstd
        Ok(std::fs::metadata(&dest_clone)?.len())
    })
    .await??;

    info!(server_id = %server_id, path = %dest.display(), size_bytes, "archive created");
    Ok(ArchiveResult { path: dest, size_bytes })
}

/// Walk the server dir into the tar, skipping process-state files.
fn append_dir_filtered<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
) -> std::io::Result<()> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let rel = path.strip_prefix(root).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path outside root")
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == PID_FILE_NAME || name == "server.pid.tmp" || name == "server_error.log" {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                builder.append_dir(rel, &path)?;
                stack.push(path);
            } else if file_type.is_file() {
                builder.append_path_with_name(&path, rel)?;
            }
            // symlinks are dropped; a world directory should not have any
        }
    }
    Ok(())
}

/// Record a finished archive and prune scheduled backups beyond `keep`.
/// Pruning failures are logged, not propagated: a leftover archive is
/// preferable to failing the backup that just succeeded.
pub async fn record_and_prune(
    pool: &SqlitePool,
    server_id: &ServerId,
    name: &str,
    archive: &ArchiveResult,
    backup_type: &str,
    keep: i64,
) -> Result<BackupId, BackupError> {
    let backup_id = BackupId::generate();
    BackupRepo::insert(
        pool,
        &NewBackup {
            id: backup_id.clone(),
            server_id: server_id.clone(),
            name: name.to_string(),
            path: archive.path.display().to_string(),
            size_bytes: archive.size_bytes,
            backup_type: backup_type.to_string(),
            status: "completed".to_string(),
        },
    )
    .await?;

    if backup_type == "scheduled" {
        prune_scheduled(pool, server_id, keep).await?;
    }
    Ok(backup_id)
}

/// Delete scheduled archives past the newest `keep`, oldest first.
pub async fn prune_scheduled(
    pool: &SqlitePool,
    server_id: &ServerId,
    keep: i64,
) -> Result<(), BackupError> {
    let overflow = BackupRepo::scheduled_overflow(pool, server_id, keep).await?;
    for row in overflow {
        if let Err(e) = std::fs::remove_file(&row.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %row.path, error = %e, "failed to remove pruned archive");
                continue;
            }
        }
        BackupRepo::delete(pool, &row.backup_id()).await?;
        info!(server_id = %server_id, name = %row.name, "pruned scheduled backup");
    }
    Ok(())
}

/// Timestamped archive name for a scheduled run.
pub fn scheduled_name(now: DateTime<Utc>) -> String {
    format!("scheduled-{}", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
