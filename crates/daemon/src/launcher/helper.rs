// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `__launch` intermediate.
//!
//! Runs as a freshly created session leader (the parent called `setsid`
//! between fork and exec). It opens the log files, binds them over the
//! JVM's stdout/stderr, spawns the JVM with stdin on the null device,
//! writes the grandchild pid atomically and exits. Redirection happens
//! here, before exec's descriptor cleanup, so the JVM always inherits
//! the correct streams.
//!
//! This runs before the tokio runtime exists; plain std io only.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::pidfile;

/// argv[1] sentinel selecting helper mode in `main`.
pub const LAUNCH_ARG: &str = "__launch";

struct HelperArgs {
    cwd: PathBuf,
    log: PathBuf,
    err: PathBuf,
    command: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<HelperArgs, String> {
    let mut cwd = None;
    let mut log = None;
    let mut err = None;
    let mut command = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cwd" => cwd = iter.next().cloned().map(PathBuf::from),
            "--log" => log = iter.next().cloned().map(PathBuf::from),
            "--err" => err = iter.next().cloned().map(PathBuf::from),
            "--" => {
                command = iter.cloned().collect();
                break;
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    let cwd = cwd.ok_or("missing --cwd")?;
    let log = log.ok_or("missing --log")?;
    let err = err.ok_or("missing --err")?;
    if command.is_empty() {
        return Err("missing command after --".to_string());
    }
    Ok(HelperArgs { cwd, log, err, command })
}

/// Helper entry point; returns the process exit code.
pub fn run(args: &[String]) -> i32 {
    match run_inner(args) {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("launch helper: {message}");
            1
        }
    }
}

fn run_inner(args: &[String]) -> Result<(), String> {
    let parsed = parse_args(args)?;

    let open = |path: &PathBuf| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("open {}: {e}", path.display()))
    };
    let log_file = open(&parsed.log)?;
    let err_file = open(&parsed.err)?;

    let (program, rest) = match parsed.command.split_first() {
        Some(split) => split,
        None => return Err("empty command".to_string()),
    };

    let child = Command::new(program)
        .args(rest)
        .current_dir(&parsed.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(err_file))
        .spawn()
        .map_err(|e| format!("spawn {program}: {e}"))?;

    pidfile::write(&parsed.cwd, child.id())
        .map_err(|e| format!("write pid file: {e}"))?;

    // Exit without waiting: the JVM is orphaned to init and keeps the
    // session. The supervisor verifies liveness through the pid file.
    Ok(())
}

#[cfg(test)]
#[path = "helper_tests.rs"]
mod tests;
