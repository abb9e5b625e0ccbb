// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery specs: supervisor restart adoption and reconciler
//! convergence.

use crate::specs::prelude::*;

use hearth_daemon::pidfile;
use hearth_storage::ServerRepo;

#[tokio::test]
async fn supervisor_restart_readopts_running_servers() {
    let fleet = Fleet::new().await;
    let id1 = fleet.create("alpha", 43200).await;
    let id2 = fleet.create("beta", 43201).await;
    fleet.start_running(&id1).await;
    fleet.start_running(&id2).await;

    let pid1 = fleet.supervisor.status(&id1).expect("status").pid.expect("pid");
    let pid2 = fleet.supervisor.status(&id2).expect("status").pid.expect("pid");

    // Simulate the daemon dying: watcher tasks stop, processes survive
    fleet.supervisor.detach_all();
    assert!(pidfile::pid_alive(pid1));
    assert!(pidfile::pid_alive(pid2));

    // A fresh supervisor over the same database re-adopts both
    let revived = fleet.respawn_supervisor();
    revived.load_records().await.expect("load");
    let reconciler = Reconciler::new(revived.clone());
    let adopted = reconciler.reconcile_on_boot().await.expect("boot reconcile");
    assert_eq!(adopted, 2);

    for (id, pid) in [(&id1, pid1), (&id2, pid2)] {
        let snapshot = revived.status(id).expect("status");
        assert_eq!(snapshot.status, ServerStatus::Running);
        assert_eq!(snapshot.pid, Some(pid), "original pid preserved");
        assert_eq!(snapshot.strategy, Some(LaunchStrategy::Adopted));
    }

    // Adopted servers still stop cleanly (no stdin: signal escalation)
    let snapshot = revived.stop(&id1, false).await.expect("stop");
    assert_eq!(snapshot.status, ServerStatus::Stopped);
    revived.stop(&id2, true).await.expect("force stop");
    eventually("beta process gone", || !pidfile::pid_alive(pid2)).await;
}

#[tokio::test]
async fn boot_reconcile_settles_rows_without_processes() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43210).await;
    fleet.start_running(&id).await;
    let pid = fleet.supervisor.status(&id).expect("status").pid.expect("pid");

    // The daemon dies AND the JVM dies while it is down
    fleet.supervisor.detach_all();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .expect("kill");
    eventually("process gone", || !pidfile::pid_alive(pid)).await;

    let revived = fleet.respawn_supervisor();
    revived.load_records().await.expect("load");
    let reconciler = Reconciler::new(revived.clone());
    let adopted = reconciler.reconcile_on_boot().await.expect("boot reconcile");
    assert_eq!(adopted, 0);

    // Row and record converge on Stopped, stale pid file removed
    let row = ServerRepo::fetch(&fleet.pool, &id).await.expect("row");
    assert_eq!(row.status(), ServerStatus::Stopped);
    assert_eq!(revived.status(&id).expect("status").status, ServerStatus::Stopped);
    assert_eq!(pidfile::read(&fleet.config.server_dir(&id)).expect("pidfile"), None);

    // And the server starts again from there
    fleet.start_running(&id).await;
    fleet.supervisor.stop(&id, true).await.expect("cleanup");
}

#[tokio::test]
async fn periodic_tick_crashes_silently_dead_servers() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43220).await;
    fleet.start_running(&id).await;
    let pid = fleet.supervisor.status(&id).expect("status").pid.expect("pid");

    // Kill the exit watcher's view first, then the process: only the
    // periodic reconciler can notice now.
    fleet.supervisor.detach_all();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .expect("kill");
    eventually("process gone", || !pidfile::pid_alive(pid)).await;

    let reconciler = Reconciler::new(fleet.supervisor.clone());
    reconciler.reconcile_tick().await;

    let snapshot = fleet.supervisor.status(&id).expect("status");
    assert_eq!(snapshot.status, ServerStatus::Crashed);
    let row = ServerRepo::fetch(&fleet.pool, &id).await.expect("row");
    assert_eq!(row.status(), ServerStatus::Crashed);
}
