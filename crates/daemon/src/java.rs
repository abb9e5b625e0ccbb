// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Java binary resolution.
//!
//! Minecraft pins minimum JVM majors by release line: up to 1.16 runs on
//! Java 8+, 1.17 through 1.20.4 needs 17+, and 1.20.5 onward needs 21+.
//! Resolution prefers explicit `JAVA_<N>_PATH` config, then the discovery
//! directories, then a `PATH` scan.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::DaemonConfig;
use crate::error::SupervisorError;

/// Minimum Java major required for a Minecraft version string.
pub fn required_major(mc_version: &str) -> u32 {
    let mut parts = mc_version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);

    if major != 1 {
        // Unknown line; assume current requirements
        return 21;
    }
    match minor {
        0..=16 => 8,
        17..=19 => 17,
        20 if patch <= 4 => 17,
        _ => 21,
    }
}

/// Pick a java binary able to run `mc_version`.
pub fn resolve(config: &DaemonConfig, mc_version: &str) -> Result<PathBuf, SupervisorError> {
    let required = required_major(mc_version);

    // Explicit config first: smallest satisfying major wins, so a 1.16
    // server prefers Java 8 over a configured Java 21.
    let mut explicit: Vec<_> =
        config.java_paths.iter().filter(|(major, _)| *major >= required).collect();
    explicit.sort_by_key(|(major, _)| *major);
    for (major, path) in explicit {
        if path.is_file() {
            debug!(%mc_version, major, path = %path.display(), "resolved java from config");
            return Ok(path.clone());
        }
    }

    // Discovery directories: look for <dir>/bin/java or <dir>/java
    for dir in &config.java_discovery_paths {
        for candidate in [dir.join("bin/java"), dir.join("java")] {
            if candidate.is_file() && version_from_path(&candidate).map_or(true, |v| v >= required) {
                debug!(%mc_version, path = %candidate.display(), "resolved java from discovery");
                return Ok(candidate);
            }
        }
    }

    // Last resort: java on PATH. No version check is possible without
    // running it, so this only satisfies the lowest requirement tier.
    if required <= 8 {
        if let Some(path) = find_on_path("java") {
            debug!(%mc_version, path = %path.display(), "resolved java from PATH");
            return Ok(path);
        }
    }

    Err(SupervisorError::JavaNotFound { mc_version: mc_version.to_string(), required })
}

/// Best-effort major version hint from a path like
/// `/usr/lib/jvm/java-17-openjdk/bin/java` or `/opt/jdk-21.0.2/bin/java`.
/// Only jdk/jre/java-named components are inspected, so unrelated digits
/// elsewhere in the path cannot masquerade as a version.
fn version_from_path(path: &Path) -> Option<u32> {
    for component in path.components().rev() {
        let name = component.as_os_str().to_string_lossy();
        if !(name.contains("java") || name.contains("jdk") || name.contains("jre")) {
            continue;
        }
        for token in name.split(|c: char| !c.is_ascii_digit()) {
            if let Ok(n) = token.parse::<u32>() {
                if (8..=30).contains(&n) {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn find_on_path(bin: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
#[path = "java_tests.rs"]
mod tests;
