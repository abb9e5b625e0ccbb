// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detached JVM launching.
//!
//! Primary strategy re-invokes the `hearthd` binary as a short-lived
//! session-leader intermediate (`__launch`): the intermediate opens the
//! log files, redirects the JVM's stdio onto them, spawns the JVM, writes
//! the pid file atomically and exits. The JVM is orphaned to init and
//! survives supervisor restarts.
//!
//! The fallback strategy spawns the JVM directly in a new session with
//! the same redirections; the child does not survive a supervisor exit
//! in every init setup, but its piped stdin enables the console
//! fallback, which is also what the integration harness uses.

pub mod helper;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use hearth_core::{LaunchStrategy, MemoryLimits};
use thiserror::Error;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::pidfile;

const HELPER_WAIT: Duration = Duration::from_secs(10);

/// What to launch and where its stdio goes.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub java: PathBuf,
    pub memory: MemoryLimits,
    /// Server directory; also the child's cwd and the pid file location.
    pub cwd: PathBuf,
    pub log_path: PathBuf,
    pub err_path: PathBuf,
    /// Preferred detachment strategy.
    pub strategy: LaunchStrategy,
    /// Intermediate binary override; defaults to `HEARTHD_BINARY`, then
    /// the current executable.
    pub helper_bin: Option<PathBuf>,
}

impl LaunchSpec {
    /// The fixed argv contract: `-Xms<min>M -Xmx<max>M -jar server.jar nogui`.
    pub fn jvm_args(&self) -> Vec<String> {
        vec![
            format!("-Xms{}M", self.memory.min_mb),
            format!("-Xmx{}M", self.memory.max_mb),
            "-jar".to_string(),
            "server.jar".to_string(),
            "nogui".to_string(),
        ]
    }
}

/// Launch failures prior to a usable child process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),

    #[error("launch helper exited with {status}: {stderr}")]
    HelperFailed { status: String, stderr: String },

    #[error("launch helper produced no pid file")]
    NoPidFile,

    #[error("pid {0} from pid file is not alive")]
    PidDead(u32),

    #[error("launch helper timed out")]
    HelperTimeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A successfully launched child.
#[derive(Debug)]
pub struct Launched {
    pub pid: u32,
    pub strategy: LaunchStrategy,
    /// Present for Direct children; used by the exit watcher to reap and
    /// capture the exit code.
    pub child: Option<Child>,
    /// Present for Direct children; console write fallback.
    pub stdin: Option<ChildStdin>,
}

/// Launch the JVM per `spec`. Double-fork failures fall back to the
/// direct strategy; the strategy actually used is reported back.
///
/// Invariant: on `Ok`, the pid file exists and the pid is alive. On
/// `Err`, neither holds.
pub async fn launch(spec: &LaunchSpec) -> Result<Launched, LaunchError> {
    if spec.strategy == LaunchStrategy::Direct {
        return launch_direct(spec).await;
    }
    match launch_detached(spec).await {
        Ok(launched) => Ok(launched),
        Err(e) => {
            warn!(error = %e, "double-fork launch failed, falling back to direct spawn");
            let _ = pidfile::remove(&spec.cwd);
            launch_direct(spec).await
        }
    }
}

fn helper_bin(spec: &LaunchSpec) -> Result<PathBuf, LaunchError> {
    if let Some(bin) = &spec.helper_bin {
        return Ok(bin.clone());
    }
    if let Ok(bin) = std::env::var("HEARTHD_BINARY") {
        return Ok(PathBuf::from(bin));
    }
    std::env::current_exe().map_err(LaunchError::Io)
}

/// Double-fork: spawn the intermediate in a new session and wait for it
/// to report the grandchild pid through the pid file.
async fn launch_detached(spec: &LaunchSpec) -> Result<Launched, LaunchError> {
    let helper = helper_bin(spec)?;
    let mut cmd = Command::new(&helper);
    cmd.arg(helper::LAUNCH_ARG)
        .arg("--cwd")
        .arg(&spec.cwd)
        .arg("--log")
        .arg(&spec.log_path)
        .arg("--err")
        .arg(&spec.err_path)
        .arg("--")
        .arg(&spec.java)
        .args(spec.jvm_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    // SAFETY: setsid is async-signal-safe and runs between fork and exec;
    // it detaches the intermediate (and thus the JVM) from our session
    // and controlling terminal.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(LaunchError::Spawn)?;
    let output = tokio::time::timeout(HELPER_WAIT, child.wait_with_output())
        .await
        .map_err(|_| LaunchError::HelperTimeout)??;

    if !output.status.success() {
        return Err(LaunchError::HelperFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let pid = pidfile::read(&spec.cwd)?.ok_or(LaunchError::NoPidFile)?;
    if !pidfile::pid_alive(pid) {
        let _ = pidfile::remove(&spec.cwd);
        return Err(LaunchError::PidDead(pid));
    }
    debug!(pid, "detached launch complete");
    Ok(Launched { pid, strategy: LaunchStrategy::DoubleFork, child: None, stdin: None })
}

/// Single spawn in a new session with explicit redirection. The file
/// descriptors are bound to the log files before exec; the JVM inherits
/// nothing else from us.
async fn launch_direct(spec: &LaunchSpec) -> Result<Launched, LaunchError> {
    let log = open_append(&spec.log_path)?;
    let err = open_append(&spec.err_path)?;

    let mut cmd = Command::new(&spec.java);
    cmd.args(spec.jvm_args())
        .current_dir(&spec.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err))
        .kill_on_drop(false);

    // SAFETY: see launch_detached.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(LaunchError::Spawn)?;
    let pid = match child.id() {
        Some(pid) => pid,
        None => {
            // Exited between spawn and here; reap and report
            let status = child.wait().await?;
            return Err(LaunchError::HelperFailed {
                status: status.to_string(),
                stderr: String::new(),
            });
        }
    };

    if let Err(e) = pidfile::write(&spec.cwd, pid) {
        let _ = child.start_kill();
        let _ = pidfile::remove(&spec.cwd);
        return Err(LaunchError::Io(e));
    }

    let stdin = child.stdin.take();
    debug!(pid, "direct launch complete");
    Ok(Launched { pid, strategy: LaunchStrategy::Direct, child: Some(child), stdin })
}

fn open_append(path: &Path) -> Result<std::fs::File, LaunchError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
