// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle specs: cold start, startup detection, graceful stop, crash
//! classification, port collisions.

use crate::specs::prelude::*;

use hearth_daemon::pidfile;
use hearth_daemon::properties::ServerProperties;
use hearth_storage::ServerRepo;

#[tokio::test]
async fn cold_start_detects_done_marker() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43100).await;

    // Subscribe before starting so the transition chain is observable
    let mut statuses = fleet.supervisor.subscribe_status(&id).expect("subscribe");
    let mut logs = fleet.supervisor.subscribe_logs(&id).expect("subscribe logs");

    let status = fleet.start_running(&id).await;
    assert_eq!(status, ServerStatus::Running);

    let snapshot = fleet.supervisor.status(&id).expect("status");
    assert_eq!(snapshot.status, ServerStatus::Running);
    assert!(snapshot.pid.is_some());
    assert!(snapshot.started_at.is_some());
    assert_eq!(snapshot.strategy, Some(LaunchStrategy::Direct));

    // The Done line reached subscribers and the ring
    let done_line = tokio::time::timeout(WAIT, async {
        loop {
            let line = logs.recv().await.expect("log stream open");
            if line.line.contains("Done (4.321s)!") {
                return line.line;
            }
        }
    })
    .await
    .expect("Done line on the stream");
    assert!(done_line.contains("Server thread/INFO"));

    eventually("Done line in the ring", || {
        fleet
            .supervisor
            .tail(&id, 50)
            .map(|tail| tail.iter().any(|l| l.contains("Done (4.321s)!")))
            .unwrap_or(false)
    })
    .await;

    // Status stream converged on Running
    statuses.changed().await.ok();
    assert_eq!(statuses.borrow_and_update().status, ServerStatus::Running);

    // Persisted status matches
    let row = ServerRepo::fetch(&fleet.pool, &id).await.expect("row");
    assert_eq!(row.status(), ServerStatus::Running);

    fleet.supervisor.stop(&id, true).await.expect("cleanup stop");
}

#[tokio::test]
async fn graceful_stop_via_console_removes_pid_file() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43110).await;
    fleet.start_running(&id).await;

    let server_dir = fleet.config.server_dir(&id);
    assert!(pidfile::read(&server_dir).expect("pid readable").is_some());

    let snapshot = fleet.supervisor.stop(&id, false).await.expect("stop");
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    assert_eq!(pidfile::read(&server_dir).expect("pid readable"), None);

    let row = ServerRepo::fetch(&fleet.pool, &id).await.expect("row");
    assert_eq!(row.status(), ServerStatus::Stopped);

    // The console path delivered a real `stop`: the script logged it on
    // its way out, and the pump's final drain picked it up
    eventually("orderly shutdown line in the tail", || {
        fleet
            .supervisor
            .tail(&id, 50)
            .map(|tail| tail.iter().any(|l| l.contains("Stopping server")))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn stop_is_idempotent_on_stopped() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43120).await;

    let first = fleet.supervisor.stop(&id, false).await.expect("stop noop");
    assert_eq!(first.status, ServerStatus::Stopped);

    // Full round trip, then stop twice
    fleet.start_running(&id).await;
    fleet.supervisor.stop(&id, false).await.expect("stop");
    let again = fleet.supervisor.stop(&id, false).await.expect("stop again");
    assert_eq!(again.status, ServerStatus::Stopped);
}

#[tokio::test]
async fn external_kill_is_classified_as_crash() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43130).await;
    fleet.start_running(&id).await;

    let mut events = fleet.bus.subscribe_server(id.clone());
    let pid = fleet.supervisor.status(&id).expect("status").pid.expect("pid");

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .expect("kill");

    // The exit watcher classifies Running -> Crashed and tells the bus
    let event = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(HearthEvent::ServerStatusChanged { new, old, reason, .. })
                    if new == ServerStatus::Crashed =>
                {
                    return (old, reason);
                }
                Some(_) => continue,
                None => panic!("bus closed early"),
            }
        }
    })
    .await
    .expect("crash event");
    assert_eq!(event.0, ServerStatus::Running);

    let snapshot = fleet.supervisor.status(&id).expect("status");
    assert_eq!(snapshot.status, ServerStatus::Crashed);
    assert_eq!(snapshot.pid, None);

    // A crashed server accepts a fresh start
    fleet.start_running(&id).await;
    assert_eq!(fleet.supervisor.status(&id).expect("status").status, ServerStatus::Running);
    fleet.supervisor.stop(&id, true).await.expect("cleanup");
}

#[tokio::test]
async fn early_exit_before_done_crashes_with_stderr_tail() {
    let fleet = Fleet::new().await;
    // A second supervisor over the same database, wired to a stub that
    // dies before the marker
    let crash_dir = fleet.root.path().join("crash");
    std::fs::create_dir_all(&crash_dir).expect("mkdir");
    let crash_java = write_stub_java(&crash_dir, StubBehavior::CrashEarly);

    let mut crash_config = fleet.config.clone();
    crash_config.java_paths = vec![(17, crash_java)];
    let supervisor = Supervisor::new(
        crash_config,
        fleet.pool.clone(),
        fleet.bus.clone(),
        std::sync::Arc::new(PlaceholderProvider),
    );
    supervisor.set_strategy(LaunchStrategy::Direct);

    let id = fleet.create("alpha", 43140).await;
    supervisor.load_records().await.expect("load");

    supervisor.start(&id).await.expect("start accepted");
    let settled = tokio::time::timeout(WAIT, supervisor.wait_startup(&id))
        .await
        .expect("settles")
        .expect("resolved");
    assert_eq!(settled, ServerStatus::Crashed);

    let snapshot = supervisor.status(&id).expect("status");
    assert_eq!(snapshot.status, ServerStatus::Crashed);
}

#[tokio::test]
async fn port_collision_on_create_is_atomic() {
    let fleet = Fleet::new().await;
    fleet.create("alpha", 43150).await;

    let err = fleet
        .supervisor
        .create(CreateServerSpec {
            name: "beta".to_string(),
            owner_id: "owner-1".to_string(),
            mc_version: "1.20.1".to_string(),
            server_type: ServerType::Vanilla,
            port: Some(43150),
            memory: MemoryLimits::new(256, 512),
            max_players: 10,
        })
        .await
        .expect_err("duplicate port must fail");
    assert!(matches!(
        err,
        hearth_daemon::SupervisorError::PortInUse(43150)
    ));

    // No beta row, no beta directory
    let rows = ServerRepo::list(&fleet.pool).await.expect("list");
    assert_eq!(rows.len(), 1);
    let dirs = std::fs::read_dir(fleet.root.path())
        .expect("read root")
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir() && e.path().join("server.properties").exists())
        .count();
    assert_eq!(dirs, 1);
}

#[tokio::test]
async fn rcon_command_round_trip() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43160).await;
    fleet.start_running(&id).await;

    // Enable RCON in the server's properties, pointing at an in-process
    // fixture that answers commands with an echo.
    let rcon_port = spawn_rcon_fixture("secret").await;
    let props_path = fleet.config.server_dir(&id).join("server.properties");
    let mut props = ServerProperties::load(&props_path).expect("props");
    props.set("enable-rcon", "true");
    props.set("rcon.port", rcon_port.to_string());
    props.set("rcon.password", "secret");
    props.save(&props_path).expect("save props");

    let response = fleet.supervisor.command(&id, "list").await.expect("command");
    assert_eq!(response, "echo:list");

    // Blocked commands are rejected at the supervisor boundary
    let err = fleet.supervisor.command(&id, "stop").await.expect_err("blocked");
    assert!(matches!(err, hearth_daemon::SupervisorError::BlockedCommand(_)));

    fleet.supervisor.stop(&id, true).await.expect("cleanup");
}

/// Minimal RCON server fixture; see the daemon's client tests for the
/// full protocol coverage.
async fn spawn_rcon_fixture(password: &'static str) -> u16 {
    use hearth_daemon::rcon::{RconCodec, RconPacket, RconPacketType};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::codec::{Decoder, Encoder};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = bytes::BytesMut::new();
                let mut authed = false;
                loop {
                    let packet = loop {
                        match RconCodec.decode(&mut buf) {
                            Ok(Some(p)) => break p,
                            Ok(None) => {}
                            Err(_) => return,
                        }
                        if socket.read_buf(&mut buf).await.unwrap_or(0) == 0 {
                            return;
                        }
                    };
                    let reply = match packet.packet_type {
                        RconPacketType::Login if packet.payload == password => {
                            authed = true;
                            RconPacket::response(packet.id, "")
                        }
                        RconPacketType::Login => RconPacket::response(-1, ""),
                        RconPacketType::Command if authed => {
                            RconPacket::response(packet.id, &format!("echo:{}", packet.payload))
                        }
                        _ => RconPacket::response(-1, ""),
                    };
                    let mut out = bytes::BytesMut::new();
                    if RconCodec.encode(reply, &mut out).is_err() {
                        return;
                    }
                    if socket.write_all(&out).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    port
}
