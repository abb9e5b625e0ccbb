// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the spec tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

pub use hearth_core::{
    CreateServerSpec, HearthEvent, LaunchStrategy, MemoryLimits, ServerId, ServerStatus,
    ServerType,
};
pub use hearth_daemon::bus::EventBus;
pub use hearth_daemon::env::DaemonConfig;
pub use hearth_daemon::jar::PlaceholderProvider;
pub use hearth_daemon::reconcile::Reconciler;
pub use hearth_daemon::supervisor::Supervisor;
pub use hearth_storage::{SqlitePool, StorageError};

/// Generous wait for cross-task effects.
pub const WAIT: Duration = Duration::from_secs(10);

/// A supervisor over a temp root with a stub java and short stop
/// timeouts.
pub struct Fleet {
    pub supervisor: Supervisor,
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub config: DaemonConfig,
    pub root: TempDir,
}

impl Fleet {
    pub async fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let java = write_stub_java(root.path(), StubBehavior::Normal);

        let mut config = DaemonConfig::for_root(root.path());
        config.java_paths = vec![(17, java)];
        config.graceful_stop_timeout = Duration::from_secs(2);
        config.port_range = (43000, 43999);

        let pool = hearth_storage::connect(&config.database_path).await.expect("db");
        let bus = EventBus::new(config.subscriber_queue);
        let supervisor =
            Supervisor::new(config.clone(), pool.clone(), bus.clone(), Arc::new(PlaceholderProvider));
        supervisor.set_strategy(LaunchStrategy::Direct);

        Self { supervisor, pool, bus, config, root }
    }

    /// Reuse this fleet's database with a brand-new supervisor, as a
    /// daemon restart would.
    pub fn respawn_supervisor(&self) -> Supervisor {
        let supervisor = Supervisor::new(
            self.config.clone(),
            self.pool.clone(),
            self.bus.clone(),
            Arc::new(PlaceholderProvider),
        );
        supervisor.set_strategy(LaunchStrategy::Direct);
        supervisor
    }

    pub async fn create(&self, name: &str, port: u16) -> ServerId {
        let row = self
            .supervisor
            .create(CreateServerSpec {
                name: name.to_string(),
                owner_id: "owner-1".to_string(),
                mc_version: "1.20.1".to_string(),
                server_type: ServerType::Vanilla,
                port: Some(port),
                memory: MemoryLimits::new(256, 512),
                max_players: 10,
            })
            .await
            .expect("create server");
        row.server_id()
    }

    /// Start and wait for Running.
    pub async fn start_running(&self, id: &ServerId) -> ServerStatus {
        let snapshot = self.supervisor.start(id).await.expect("start");
        // The startup watcher may already have won the race to Running
        assert!(
            matches!(snapshot.status, ServerStatus::Starting | ServerStatus::Running),
            "start returned {:?}",
            snapshot.status
        );
        tokio::time::timeout(WAIT, self.supervisor.wait_startup(id))
            .await
            .expect("startup within window")
            .expect("startup resolved")
    }
}

/// Stub flavors for failure injection.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Print a banner, the Done marker, then serve stdin (`stop` exits
    /// 0); exit 0 on SIGTERM.
    Normal,
    /// Exit 3 before ever printing the Done marker.
    CrashEarly,
}

/// Write the stub java script used in place of a real JVM.
pub fn write_stub_java(dir: &Path, behavior: StubBehavior) -> PathBuf {
    let path = dir.join("java");
    let script = match behavior {
        StubBehavior::Normal => concat!(
            "#!/bin/sh\n",
            "trap 'exit 0' TERM\n",
            "echo '[12:34:56] [Server thread/INFO]: Starting minecraft server version 1.20.1'\n",
            "echo '[12:34:56] [Server thread/INFO]: Done (4.321s)! For help, type \"help\"'\n",
            "while read -r line; do\n",
            "  [ \"$line\" = stop ] && { echo '[12:35:00] [Server thread/INFO]: Stopping server'; exit 0; }\n",
            "done\n",
            "while :; do sleep 0.2; done\n",
        ),
        StubBehavior::CrashEarly => concat!(
            "#!/bin/sh\n",
            "echo '[12:34:56] [Server thread/INFO]: Starting minecraft server version 1.20.1'\n",
            "echo 'Error: A JNI error has occurred' >&2\n",
            "exit 3\n",
        ),
    };
    std::fs::write(&path, script).expect("write stub java");
    let mut perms = std::fs::metadata(&path).expect("stat").permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

/// Wait until `check` passes or the budget runs out.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for: {what}");
}
