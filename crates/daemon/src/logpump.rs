// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log pump: tails a server's `logs/latest.log` and feeds the record.
//!
//! One pump task per live server. Lines flow to the ring buffer and the
//! record's broadcast channel; the first startup marker fires the
//! `done_tx` handle the startup watcher is waiting on. Rotation (inode
//! change or truncation) re-opens from byte 0. The pump reads to EOF in
//! bounded chunks, so a fast-growing file lags rather than OOMs.

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hearth_core::LogLine;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::record::{file_tail, ServerRecord};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 64 * 1024;

/// Quiet-log diagnostics thresholds after a start.
const QUIET_WARN_AFTER: Duration = Duration::from_secs(5);
const QUIET_STDERR_AFTER: Duration = Duration::from_secs(30);

/// The vanilla/Paper/Spigot world-ready marker: a line whose message
/// contains `Done (<seconds>s)!`.
pub fn is_done_marker(line: &str) -> bool {
    match line.find("Done (") {
        Some(idx) => line[idx..].contains("s)!"),
        None => false,
    }
}

/// Pump configuration.
pub struct PumpConfig {
    /// Start at EOF instead of byte 0 (re-adopted servers).
    pub seek_to_end: bool,
    /// Resolved once on the first startup marker.
    pub done_tx: Option<oneshot::Sender<()>>,
}

/// Spawn the pump task for `record`. Terminates when `token` cancels.
pub fn spawn(
    record: Arc<ServerRecord>,
    config: PumpConfig,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut pump = Pump {
            record,
            log_path: PathBuf::new(),
            file: None,
            ino: 0,
            offset: 0,
            partial: String::new(),
            done_tx: config.done_tx,
            seek_to_end: config.seek_to_end,
            started: tokio::time::Instant::now(),
            quiet_warned: false,
            stderr_inspected: false,
            saw_bytes: false,
        };
        pump.log_path = pump.record.log_path();

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    // Final drain so the lines the process wrote on its
                    // way out still reach the ring and subscribers.
                    pump.poll_once().await;
                    debug!(server_id = %pump.record.server_id, "log pump stopped");
                    return;
                }
                _ = ticker.tick() => {
                    pump.poll_once().await;
                }
            }
        }
    })
}

struct Pump {
    record: Arc<ServerRecord>,
    log_path: PathBuf,
    file: Option<tokio::fs::File>,
    ino: u64,
    offset: u64,
    partial: String,
    done_tx: Option<oneshot::Sender<()>>,
    seek_to_end: bool,
    started: tokio::time::Instant,
    quiet_warned: bool,
    stderr_inspected: bool,
    saw_bytes: bool,
}

impl Pump {
    async fn poll_once(&mut self) {
        let meta = match tokio::fs::metadata(&self.log_path).await {
            Ok(meta) => meta,
            Err(_) => {
                // Not created yet, or rotated away mid-poll
                self.file = None;
                self.quiet_diagnostics().await;
                return;
            }
        };

        let rotated = self.file.is_some() && (meta.ino() != self.ino || meta.len() < self.offset);
        if rotated {
            debug!(server_id = %self.record.server_id, "log rotation detected, re-opening");
            self.file = None;
            self.partial.clear();
        }

        if self.file.is_none() {
            match tokio::fs::File::open(&self.log_path).await {
                Ok(mut file) => {
                    self.ino = meta.ino();
                    self.offset = if self.seek_to_end && !rotated { meta.len() } else { 0 };
                    self.seek_to_end = false;
                    if self.offset > 0 {
                        if file.seek(std::io::SeekFrom::Start(self.offset)).await.is_err() {
                            self.offset = 0;
                        }
                    }
                    self.file = Some(file);
                }
                Err(e) => {
                    debug!(server_id = %self.record.server_id, error = %e, "log open failed");
                    self.quiet_diagnostics().await;
                    return;
                }
            }
        }

        self.drain_available().await;
        if !self.saw_bytes {
            self.quiet_diagnostics().await;
        }
    }

    /// Read to EOF in bounded chunks, emitting complete lines.
    async fn drain_available(&mut self) {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let Some(file) = self.file.as_mut() else { return };
            match file.read(&mut chunk).await {
                Ok(0) => return,
                Ok(n) => {
                    self.saw_bytes = true;
                    self.offset += n as u64;
                    self.partial.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    self.emit_complete_lines();
                }
                Err(e) => {
                    warn!(server_id = %self.record.server_id, error = %e, "log read failed");
                    self.file = None;
                    return;
                }
            }
        }
    }

    fn emit_complete_lines(&mut self) {
        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            if is_done_marker(&line) {
                if let Some(done) = self.done_tx.take() {
                    let _ = done.send(());
                }
            }
            self.record.push_log_line(LogLine::new(line, Utc::now()));
        }
    }

    /// No output yet: at 5s warn with what we can see of the file, at 30s
    /// capture the stderr tail so a subsequent crash has a reason.
    async fn quiet_diagnostics(&mut self) {
        let elapsed = self.started.elapsed();
        if !self.quiet_warned && elapsed >= QUIET_WARN_AFTER {
            self.quiet_warned = true;
            match std::fs::metadata(&self.log_path) {
                Ok(meta) => warn!(
                    server_id = %self.record.server_id,
                    path = %self.log_path.display(),
                    size = meta.len(),
                    mode = format!("{:o}", meta.mode()),
                    "no log output 5s after start"
                ),
                Err(_) => warn!(
                    server_id = %self.record.server_id,
                    path = %self.log_path.display(),
                    "log file still missing 5s after start"
                ),
            }
        }
        if !self.stderr_inspected && elapsed >= QUIET_STDERR_AFTER {
            self.stderr_inspected = true;
            let tail = file_tail(&self.record.err_path(), 20);
            if !tail.is_empty() {
                warn!(
                    server_id = %self.record.server_id,
                    lines = tail.len(),
                    "log still silent at 30s, captured stderr tail"
                );
                self.record.set_stderr_tail(tail);
            }
        }
    }
}

#[cfg(test)]
#[path = "logpump_tests.rs"]
mod tests;
