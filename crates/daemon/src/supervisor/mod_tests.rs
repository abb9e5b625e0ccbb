// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::jar::PlaceholderProvider;
use hearth_core::{CreateServerSpec, MemoryLimits, ServerType};
use hearth_storage::connect_memory;
use tempfile::TempDir;

async fn test_supervisor() -> (Supervisor, TempDir) {
    let root = tempfile::tempdir().unwrap();
    let config = DaemonConfig::for_root(root.path());
    let pool = connect_memory().await.unwrap();
    let bus = EventBus::new(config.subscriber_queue);
    let supervisor = Supervisor::new(config, pool, bus, Arc::new(PlaceholderProvider));
    supervisor.set_strategy(LaunchStrategy::Direct);
    (supervisor, root)
}

fn spec(name: &str, port: Option<u16>) -> CreateServerSpec {
    CreateServerSpec {
        name: name.to_string(),
        owner_id: "owner-1".to_string(),
        mc_version: "1.20.1".to_string(),
        server_type: ServerType::Vanilla,
        port,
        memory: MemoryLimits::new(512, 1024),
        max_players: 10,
    }
}

#[tokio::test]
async fn create_scaffolds_directory_and_row() {
    let (supervisor, root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41300))).await.unwrap();

    assert_eq!(row.port_u16(), 41300);
    assert_eq!(row.status(), ServerStatus::Stopped);

    let dir = root.path().join(&row.id);
    assert!(dir.join("server.properties").exists());
    assert!(dir.join("eula.txt").exists());
    assert!(dir.join("server.jar").exists());
    assert!(dir.join("logs").is_dir());
    assert_eq!(
        std::fs::read_to_string(dir.join("eula.txt")).unwrap(),
        "eula=true\n"
    );

    // The record materialized in Stopped
    let snapshot = supervisor.status(&row.server_id()).unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
}

#[tokio::test]
async fn create_rejects_taken_port_without_side_effects() {
    let (supervisor, root) = test_supervisor().await;
    supervisor.create(spec("alpha", Some(41310))).await.unwrap();

    let err = supervisor.create(spec("beta", Some(41310))).await.unwrap_err();
    assert!(matches!(err, SupervisorError::PortInUse(41310)));

    // Exactly one server directory exists (alpha's); no beta debris
    let dirs: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    assert_eq!(dirs.len(), 1);
}

#[tokio::test]
async fn create_rejects_duplicate_name_per_owner() {
    let (supervisor, _root) = test_supervisor().await;
    supervisor.create(spec("alpha", Some(41320))).await.unwrap();

    let err = supervisor.create(spec("alpha", Some(41321))).await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::Storage(hearth_storage::StorageError::Conflict(_))
    ));
}

#[tokio::test]
async fn create_auto_allocates_port() {
    let (supervisor, _root) = test_supervisor().await;
    let mut config_spec = spec("alpha", None);
    config_spec.port = None;
    let row = supervisor.create(config_spec).await.unwrap();
    let (start, end) = (25565, 25700);
    assert!(row.port_u16() >= start && row.port_u16() <= end);
}

#[tokio::test]
async fn start_without_java_rolls_back_to_stopped() {
    let (supervisor, _root) = test_supervisor().await;
    // 1.20.5 needs Java 21; the test config has no java at all and PATH
    // scanning only applies to the Java 8 tier.
    let mut s = spec("alpha", Some(41330));
    s.mc_version = "1.20.5".to_string();
    let row = supervisor.create(s).await.unwrap();
    let id = row.server_id();

    let err = supervisor.start(&id).await.unwrap_err();
    assert!(matches!(err, SupervisorError::JavaNotFound { required: 21, .. }));

    // Rolled back through Stopping to Stopped; start is accepted again
    assert_eq!(supervisor.status(&id).unwrap().status, ServerStatus::Stopped);
    let err = supervisor.start(&id).await.unwrap_err();
    assert!(matches!(err, SupervisorError::JavaNotFound { .. }));
}

#[tokio::test]
async fn stop_on_stopped_is_a_noop() {
    let (supervisor, _root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41340))).await.unwrap();
    let id = row.server_id();

    let snapshot = supervisor.stop(&id, false).await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    let snapshot = supervisor.stop(&id, true).await.unwrap();
    assert_eq!(snapshot.status, ServerStatus::Stopped);
}

#[tokio::test]
async fn command_requires_running() {
    let (supervisor, _root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41350))).await.unwrap();
    let id = row.server_id();

    let err = supervisor.command(&id, "list").await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning(ServerStatus::Stopped)));
}

#[tokio::test]
async fn blocked_commands_never_reach_rcon() {
    let (supervisor, _root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41360))).await.unwrap();
    let id = row.server_id();

    for blocked in ["stop", "/stop", "restart", "shutdown now"] {
        let err = supervisor.command(&id, blocked).await.unwrap_err();
        assert!(
            matches!(err, SupervisorError::BlockedCommand(_)),
            "{blocked} should be blocked, got {err:?}"
        );
    }
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let (supervisor, _root) = test_supervisor().await;
    let ghost = ServerId::generate();

    assert!(matches!(
        supervisor.status(&ghost).unwrap_err(),
        SupervisorError::NotFound(_)
    ));
    assert!(matches!(
        supervisor.start(&ghost).await.unwrap_err(),
        SupervisorError::NotFound(_)
    ));
    assert!(matches!(
        supervisor.tail(&ghost, 10).unwrap_err(),
        SupervisorError::NotFound(_)
    ));
}

#[tokio::test]
async fn delete_requires_terminal_and_releases_resources() {
    let (supervisor, _root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41370))).await.unwrap();
    let id = row.server_id();

    supervisor.delete(&id).await.unwrap();
    assert!(matches!(
        supervisor.status(&id).unwrap_err(),
        SupervisorError::NotFound(_)
    ));

    // Port and name are reusable after the soft delete
    supervisor.create(spec("alpha", Some(41370))).await.unwrap();
}

#[tokio::test]
async fn load_records_materializes_rows() {
    let (supervisor, _root) = test_supervisor().await;
    let row = supervisor.create(spec("alpha", Some(41380))).await.unwrap();
    let id = row.server_id();

    // Simulate a fresh supervisor over the same pool
    let fresh = Supervisor::new(
        supervisor.inner.config.clone(),
        supervisor.inner.pool.clone(),
        EventBus::new(8),
        Arc::new(PlaceholderProvider),
    );
    assert!(fresh.status(&id).is_err());
    let count = fresh.load_records().await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(fresh.status(&id).unwrap().status, ServerStatus::Stopped);
}

#[tokio::test]
async fn status_transitions_publish_to_bus() {
    let (supervisor, _root) = test_supervisor().await;
    let mut events = supervisor.inner.bus.subscribe();

    // Drive a transition through the record helpers directly
    let row = supervisor.create(spec("alpha", Some(41390))).await.unwrap();
    let id = row.server_id();
    let record = supervisor.record(&id).unwrap();
    let transition = record.begin_start().unwrap();
    supervisor.emit_transition(&transition);

    let event = events.recv().await.unwrap();
    match event {
        hearth_core::HearthEvent::ServerStatusChanged { server_id, old, new, .. } => {
            assert_eq!(server_id, id);
            assert_eq!(old, ServerStatus::Stopped);
            assert_eq!(new, ServerStatus::Starting);
        }
        other => panic!("unexpected event {other:?}"),
    }
}
