// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory per-server state.
//!
//! All mutations of status, pid and the waiter lists happen under the
//! record mutex; channel sends happen after the lock is released so a
//! slow consumer can never stall a transition. The log stream is a
//! broadcast ring (lossy, drop-oldest); the status stream is a watch
//! channel (coalescing, latest wins).

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_core::{LaunchStrategy, LogLine, ServerId, ServerStatus, StatusSnapshot, TransitionError};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::pidfile;

/// Mutable state behind the record mutex.
struct RecordState {
    status: ServerStatus,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    strategy: Option<LaunchStrategy>,
    ring: VecDeque<LogLine>,
    startup_waiters: Vec<oneshot::Sender<ServerStatus>>,
    stop_waiters: Vec<oneshot::Sender<ServerStatus>>,
    crash_reason: Option<String>,
    stderr_tail: Vec<String>,
    /// Cancels the LogPump/ExitWatcher/StartupWatcher of the current run.
    run_token: CancellationToken,
}

/// One managed server. Owned by the supervisor's record map; the pump and
/// watcher tasks hold `Arc`s for their (cancellable) lifetime.
pub struct ServerRecord {
    pub server_id: ServerId,
    pub dir: PathBuf,
    ring_cap: usize,
    state: Mutex<RecordState>,
    log_tx: broadcast::Sender<LogLine>,
    status_tx: watch::Sender<StatusSnapshot>,
    /// Lazily-created RCON session; populated only while Running.
    pub rcon: tokio::sync::Mutex<Option<crate::rcon::RconClient>>,
    /// Piped stdin of a Direct-strategy child; console fallback channel.
    pub stdin: tokio::sync::Mutex<Option<tokio::process::ChildStdin>>,
}

impl ServerRecord {
    pub fn new(
        server_id: ServerId,
        dir: PathBuf,
        initial: ServerStatus,
        ring_cap: usize,
        queue_cap: usize,
    ) -> Arc<Self> {
        let (log_tx, _) = broadcast::channel(queue_cap.max(1));
        let snapshot = StatusSnapshot {
            server_id: server_id.clone(),
            status: initial,
            pid: None,
            started_at: None,
            strategy: None,
        };
        let (status_tx, _) = watch::channel(snapshot);
        Arc::new(Self {
            server_id,
            dir,
            ring_cap: ring_cap.max(1),
            state: Mutex::new(RecordState {
                status: initial,
                pid: None,
                started_at: None,
                strategy: None,
                ring: VecDeque::new(),
                startup_waiters: Vec::new(),
                stop_waiters: Vec::new(),
                crash_reason: None,
                stderr_tail: Vec::new(),
                run_token: CancellationToken::new(),
            }),
            log_tx,
            status_tx,
            rcon: tokio::sync::Mutex::new(None),
            stdin: tokio::sync::Mutex::new(None),
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("logs/latest.log")
    }

    pub fn err_path(&self) -> PathBuf {
        self.dir.join("server_error.log")
    }

    pub fn pid_file(&self) -> PathBuf {
        pidfile::path_for(&self.dir)
    }

    // -- reads --

    pub fn status(&self) -> ServerStatus {
        self.state.lock().status
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().pid
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock();
        StatusSnapshot {
            server_id: self.server_id.clone(),
            status: state.status,
            pid: state.pid,
            started_at: state.started_at,
            strategy: state.strategy,
        }
    }

    /// Last `n` log lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let state = self.state.lock();
        state.ring.iter().rev().take(n).rev().map(|l| l.line.clone()).collect()
    }

    pub fn crash_reason(&self) -> Option<String> {
        self.state.lock().crash_reason.clone()
    }

    pub fn stderr_tail(&self) -> Vec<String> {
        self.state.lock().stderr_tail.clone()
    }

    /// Token cancelling the current run's tasks.
    pub fn run_token(&self) -> CancellationToken {
        self.state.lock().run_token.clone()
    }

    // -- subscriptions --

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogLine> {
        self.log_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// One-shot handle resolved when the server reaches Running or
    /// Crashed. Resolves immediately if it is already there.
    pub fn wait_for_startup(&self) -> oneshot::Receiver<ServerStatus> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        match state.status {
            ServerStatus::Running | ServerStatus::Crashed => {
                let _ = tx.send(state.status);
            }
            _ => state.startup_waiters.push(tx),
        }
        rx
    }

    /// One-shot handle resolved when the server reaches Stopped or
    /// Crashed.
    pub fn wait_for_stop(&self) -> oneshot::Receiver<ServerStatus> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        match state.status {
            ServerStatus::Stopped | ServerStatus::Crashed => {
                let _ = tx.send(state.status);
            }
            _ => state.stop_waiters.push(tx),
        }
        rx
    }

    // -- log ingestion (called by the pump) --

    /// Append a line to the ring and fan out to subscribers. The broadcast
    /// ring drops the oldest entry for lagging receivers instead of
    /// blocking the pump.
    pub fn push_log_line(&self, line: LogLine) {
        {
            let mut state = self.state.lock();
            if state.ring.len() >= self.ring_cap {
                state.ring.pop_front();
            }
            state.ring.push_back(line.clone());
        }
        let _ = self.log_tx.send(line);
    }

    pub fn set_stderr_tail(&self, tail: Vec<String>) {
        self.state.lock().stderr_tail = tail;
    }

    // -- transitions (called by the supervisor) --

    /// Accept a start: Stopped/Crashed → Starting. Issues a fresh run
    /// token and clears the previous run's crash debris.
    pub fn begin_start(&self) -> Result<Transition, TransitionError> {
        self.apply(ServerStatus::Starting, None, |state| {
            state.pid = None;
            state.started_at = None;
            state.strategy = None;
            state.crash_reason = None;
            state.stderr_tail = Vec::new();
            state.run_token = CancellationToken::new();
        })
    }

    /// Record the launcher's result while still Starting.
    pub fn launched(&self, pid: u32, strategy: LaunchStrategy) {
        let mut state = self.state.lock();
        state.pid = Some(pid);
        state.strategy = Some(strategy);
        drop(state);
        self.status_tx.send_replace(self.snapshot());
    }

    /// Starting → Running (Done marker, startup timeout with a live
    /// process, or adoption hand-off).
    pub fn mark_running(
        &self,
        now: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Transition, TransitionError> {
        self.apply(ServerStatus::Running, reason, |state| {
            state.started_at = Some(now);
        })
    }

    /// Starting/Running → Stopping.
    pub fn begin_stop(&self) -> Result<Transition, TransitionError> {
        self.apply(ServerStatus::Stopping, None, |_| {})
    }

    /// Stopping → Stopped (orderly exit) or Crashed → Stopped (operator
    /// clear). Cancels the run's tasks and clears the pid.
    pub fn mark_stopped(&self, reason: Option<String>) -> Result<Transition, TransitionError> {
        self.apply(ServerStatus::Stopped, reason, |state| {
            state.pid = None;
            state.started_at = None;
            state.run_token.cancel();
        })
    }

    /// Any live state → Crashed. Keeps the stderr tail for the error
    /// surface and cancels the run's tasks.
    pub fn mark_crashed(&self, reason: String) -> Result<Transition, TransitionError> {
        self.apply(ServerStatus::Crashed, Some(reason.clone()), |state| {
            state.pid = None;
            state.crash_reason = Some(reason);
            state.run_token.cancel();
        })
    }

    /// Validate the edge, mutate under the lock, resolve waiters, then
    /// notify the status stream outside the lock.
    fn apply(
        &self,
        to: ServerStatus,
        reason: Option<String>,
        mutate: impl FnOnce(&mut RecordState),
    ) -> Result<Transition, TransitionError> {
        let (old, waiters) = {
            let mut state = self.state.lock();
            let old = state.status;
            state.status = old.transition_to(to)?;
            mutate(&mut state);

            let mut waiters = Vec::new();
            if matches!(to, ServerStatus::Running | ServerStatus::Crashed) {
                waiters.append(&mut state.startup_waiters);
            }
            if matches!(to, ServerStatus::Stopped | ServerStatus::Crashed) {
                waiters.append(&mut state.stop_waiters);
            }
            (old, waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(to);
        }
        let snapshot = self.snapshot();
        self.status_tx.send_replace(snapshot.clone());

        Ok(Transition { old, new: to, reason, snapshot })
    }

    /// Seed pid/start time for a process adopted by the reconciler. Only
    /// meaningful on a record constructed in Running.
    pub fn adopt(&self, pid: u32, started_at: Option<DateTime<Utc>>) {
        {
            let mut state = self.state.lock();
            state.pid = Some(pid);
            state.started_at = started_at;
            state.strategy = Some(LaunchStrategy::Adopted);
        }
        self.status_tx.send_replace(self.snapshot());
    }

    /// Remove this run's pid file, tolerating its absence.
    pub fn clear_pid_file(&self) {
        let _ = pidfile::remove(&self.dir);
    }
}

/// Outcome of a successful transition, carried to the event bus.
#[derive(Debug, Clone)]
pub struct Transition {
    pub old: ServerStatus,
    pub new: ServerStatus,
    pub reason: Option<String>,
    pub snapshot: StatusSnapshot,
}

/// Read the last `n` lines of a file, for crash diagnostics.
pub fn file_tail(path: &Path, n: usize) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let lines: Vec<&str> = text.lines().collect();
            let skip = lines.len().saturating_sub(n);
            lines[skip..].iter().map(|s| s.to_string()).collect()
        }
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
