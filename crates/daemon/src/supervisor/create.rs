// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server creation: directory scaffold, config files, jar, database row.

use hearth_core::{CreateServerSpec, ServerId, ServerStatus};
use hearth_storage::{NewServer, ServerRepo, ServerRow, StorageError};
use tracing::info;
use uuid::Uuid;

use crate::error::SupervisorError;
use crate::{ports, properties};

use super::Supervisor;

impl Supervisor {
    /// Create a server: allocate (or validate) the port, scaffold the
    /// directory with `server.properties` and `eula.txt`, provision the
    /// jar, persist the row in Stopped.
    ///
    /// Atomicity: the database insert is last; any earlier failure rolls
    /// the directory back, and an insert failure (e.g. a concurrent
    /// create winning the port) removes the directory too. No partial
    /// server survives an error.
    pub async fn create(&self, spec: CreateServerSpec) -> Result<ServerRow, SupervisorError> {
        let pool = &self.inner.pool;
        let config = &self.inner.config;

        if spec.name.trim().is_empty() {
            return Err(SupervisorError::internal("server name must not be empty"));
        }
        if ServerRepo::name_taken(pool, &spec.owner_id, &spec.name).await? {
            return Err(SupervisorError::Storage(StorageError::Conflict(format!(
                "name already in use: {}",
                spec.name
            ))));
        }

        let port = match spec.port {
            Some(port) => {
                ports::validate(pool, port).await?;
                port
            }
            None => ports::allocate(pool, config.port_range).await?,
        };

        let id = ServerId::generate();
        let dir = config.server_dir(&id);
        std::fs::create_dir_all(dir.join("logs")).map_err(SupervisorError::from_io)?;

        let result = self.scaffold_and_insert(&spec, &id, port).await;
        match result {
            Ok(row) => {
                self.insert_record(id.clone(), dir, ServerStatus::Stopped);
                info!(server_id = %id, name = %spec.name, port, "server created");
                Ok(row)
            }
            Err(e) => {
                // Roll the directory back; the row either never landed or
                // failed its unique checks.
                let _ = std::fs::remove_dir_all(&dir);
                Err(e)
            }
        }
    }

    async fn scaffold_and_insert(
        &self,
        spec: &CreateServerSpec,
        id: &ServerId,
        port: u16,
    ) -> Result<ServerRow, SupervisorError> {
        let config = &self.inner.config;
        let dir = config.server_dir(id);

        let mut props = properties::defaults(port, spec.max_players);
        if config.rcon_auto_enable {
            let password = Uuid::new_v4().simple().to_string();
            properties::enable_rcon(&mut props, port, &password);
        }
        props
            .save(&dir.join("server.properties"))
            .map_err(SupervisorError::from_io)?;
        std::fs::write(dir.join("eula.txt"), properties::EULA_ACCEPTED)
            .map_err(SupervisorError::from_io)?;

        self.inner
            .jar_provider
            .provide(spec.server_type, &spec.mc_version, &dir)
            .await?;

        let row = ServerRepo::insert(
            &self.inner.pool,
            &NewServer {
                id: id.clone(),
                name: spec.name.clone(),
                owner_id: spec.owner_id.clone(),
                mc_version: spec.mc_version.clone(),
                server_type: spec.server_type,
                directory_path: dir.display().to_string(),
                port,
                memory: spec.memory,
                max_players: spec.max_players,
            },
        )
        .await?;
        Ok(row)
    }
}
