// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic pid file handling.
//!
//! The launcher is the only writer; the reconciler is the only other
//! reader/cleaner. Writes go through a temp file and rename so a
//! concurrent reader never observes a partial pid.

use std::io;
use std::path::{Path, PathBuf};

use nix::sys::signal::kill;
use nix::unistd::Pid;

pub const PID_FILE_NAME: &str = "server.pid";

/// Pid file path for a server directory.
pub fn path_for(server_dir: &Path) -> PathBuf {
    server_dir.join(PID_FILE_NAME)
}

/// Atomically write `pid` to `<dir>/server.pid` via tmp + rename.
pub fn write(server_dir: &Path, pid: u32) -> io::Result<()> {
    let final_path = path_for(server_dir);
    let tmp_path = server_dir.join(format!("{PID_FILE_NAME}.tmp"));
    std::fs::write(&tmp_path, format!("{pid}\n"))?;
    std::fs::rename(&tmp_path, &final_path)
}

/// Read the pid file if present. `Ok(None)` means no file; a file that
/// does not parse as a pid is reported as corrupt.
pub fn read(server_dir: &Path) -> io::Result<Option<u32>> {
    let path = path_for(server_dir);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    text.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("corrupt pid file {}", path.display())))
}

/// Remove the pid file, ignoring an already-missing file.
pub fn remove(server_dir: &Path) -> io::Result<()> {
    match std::fs::remove_file(path_for(server_dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether a process with this pid exists (signal 0 probe). A zombie
/// counts as dead: an unreaped direct child still answers the probe but
/// is long past supervision.
pub fn pid_alive(pid: u32) -> bool {
    if kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    !is_zombie(pid)
}

/// Linux: state field of `/proc/<pid>/stat`, which follows the
/// parenthesized comm (the comm itself may contain spaces).
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rsplit_once(')')
        .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
