// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server jar provisioning seam.
//!
//! Fetching jars from version catalogs is a collaborator concern; the
//! supervisor only needs `server.jar` to exist in the directory before
//! launch. [`FileCopyProvider`] links from a local cache, which is what a
//! deployment with a pre-warmed jar store uses.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hearth_core::ServerType;
use thiserror::Error;

pub const SERVER_JAR: &str = "server.jar";

#[derive(Debug, Error)]
pub enum JarError {
    #[error("no cached jar for {server_type} {mc_version}")]
    NotCached { server_type: ServerType, mc_version: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supplies `server.jar` for a new server directory.
#[async_trait]
pub trait JarProvider: Send + Sync {
    async fn provide(
        &self,
        server_type: ServerType,
        mc_version: &str,
        dest_dir: &Path,
    ) -> Result<(), JarError>;
}

/// Copies jars out of a local cache laid out as
/// `<cache>/<type>-<version>.jar`.
pub struct FileCopyProvider {
    cache_dir: PathBuf,
}

impl FileCopyProvider {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self { cache_dir: cache_dir.into() }
    }

    fn cached_path(&self, server_type: ServerType, mc_version: &str) -> PathBuf {
        self.cache_dir.join(format!("{server_type}-{mc_version}.jar"))
    }
}

#[async_trait]
impl JarProvider for FileCopyProvider {
    async fn provide(
        &self,
        server_type: ServerType,
        mc_version: &str,
        dest_dir: &Path,
    ) -> Result<(), JarError> {
        let source = self.cached_path(server_type, mc_version);
        if !source.is_file() {
            return Err(JarError::NotCached {
                server_type,
                mc_version: mc_version.to_string(),
            });
        }
        let dest = dest_dir.join(SERVER_JAR);
        tokio::fs::copy(&source, &dest).await?;
        Ok(())
    }
}

/// Writes a placeholder jar; enough for tests and for deployments where
/// an operator drops the real jar in afterwards.
pub struct PlaceholderProvider;

#[async_trait]
impl JarProvider for PlaceholderProvider {
    async fn provide(
        &self,
        _server_type: ServerType,
        _mc_version: &str,
        dest_dir: &Path,
    ) -> Result<(), JarError> {
        tokio::fs::write(dest_dir.join(SERVER_JAR), b"").await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "jar_tests.rs"]
mod tests;
