// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup scheduling specs: CRUD round-trips, the skip-when-stopped
//! window, and end-to-end scheduled archives.

use crate::specs::prelude::*;

use chrono::{Duration as ChronoDuration, Utc};
use hearth_core::FakeClock;
use hearth_daemon::scheduler::BackupScheduler;
use hearth_storage::{BackupRepo, NewSchedule, ScheduleRepo, ScheduleUpdate};

fn schedule(server_id: &ServerId, only_when_running: bool) -> NewSchedule {
    NewSchedule {
        server_id: server_id.clone(),
        interval_hours: 6,
        max_backups: 5,
        enabled: true,
        only_when_running,
        actor: Some("specs".to_string()),
    }
}

#[tokio::test]
async fn schedule_crud_round_trip() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43300).await;
    let scheduler = BackupScheduler::with_clock(fleet.supervisor.clone(), FakeClock::new());

    let before = Utc::now();
    let created = scheduler.create_schedule(schedule(&id, true)).await.expect("create");
    assert_eq!(created.interval_hours, 6);
    assert_eq!(created.max_backups, 5);
    assert!(created.enabled);
    assert!(created.only_when_running);
    assert!(created.next_backup_at >= before);
    assert!(created.next_backup_at <= Utc::now() + ChronoDuration::hours(6));

    let read = scheduler.get_schedule(&id).await.expect("read");
    assert_eq!(read.interval_hours, created.interval_hours);
    assert_eq!(read.max_backups, created.max_backups);
    assert_eq!(read.enabled, created.enabled);
    assert_eq!(read.only_when_running, created.only_when_running);

    let updated = scheduler
        .update_schedule(&id, ScheduleUpdate { max_backups: Some(2), ..Default::default() })
        .await
        .expect("update");
    assert_eq!(updated.max_backups, 2);
    assert_eq!(updated.interval_hours, 6, "partial update leaves the rest");

    scheduler.delete_schedule(&id, Some("specs")).await.expect("delete");
    assert!(scheduler.get_schedule(&id).await.is_err());

    // The audit log recorded the whole story, in order
    let actions: Vec<String> = ScheduleRepo::logs(&fleet.pool, &id)
        .await
        .expect("logs")
        .into_iter()
        .map(|l| l.action)
        .collect();
    assert_eq!(actions, vec!["created", "updated", "deleted"]);
}

#[tokio::test]
async fn skip_when_not_running_advances_the_window() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43310).await;
    let clock = FakeClock::new();
    let scheduler = BackupScheduler::with_clock(fleet.supervisor.clone(), clock.clone());

    let mut created = schedule(&id, true);
    created.interval_hours = 1;
    let row = scheduler.create_schedule(created).await.expect("create");

    // Server is Stopped; jump past the window and tick
    let fire_at = row.next_backup_at + ChronoDuration::minutes(1);
    clock.set_utc(fire_at);
    scheduler.tick().await;

    let logs = ScheduleRepo::logs(&fleet.pool, &id).await.expect("logs");
    let last = logs.last().expect("entries");
    assert_eq!(last.action, "skipped");
    assert_eq!(last.reason, "not running");

    let after = scheduler.get_schedule(&id).await.expect("read");
    let expected_next = fire_at + ChronoDuration::hours(1);
    assert!((after.next_backup_at - expected_next).num_seconds().abs() < 1);
    assert!(after.last_backup_at.is_none());
    assert!(
        BackupRepo::list_for_server(&fleet.pool, &id).await.expect("list").is_empty(),
        "no archive was created"
    );
}

#[tokio::test]
async fn scheduled_backup_archives_a_running_server() {
    let fleet = Fleet::new().await;
    let id = fleet.create("alpha", 43320).await;
    fleet.start_running(&id).await;

    // Give the world something worth archiving
    let world = fleet.config.server_dir(&id).join("world");
    std::fs::create_dir_all(&world).expect("world dir");
    std::fs::write(world.join("level.dat"), b"level").expect("level");

    let clock = FakeClock::new();
    let scheduler = BackupScheduler::with_clock(fleet.supervisor.clone(), clock.clone());
    let row = scheduler.create_schedule(schedule(&id, true)).await.expect("create");

    let mut events = fleet.bus.subscribe_server(id.clone());
    clock.set_utc(row.next_backup_at + ChronoDuration::minutes(1));
    scheduler.tick().await;

    // Archive row + file exist
    let backups = BackupRepo::list_for_server(&fleet.pool, &id).await.expect("list");
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].backup_type, "scheduled");
    assert_eq!(backups[0].status, "completed");
    assert!(std::path::Path::new(&backups[0].path).exists());
    assert!(backups[0].size_bytes > 0);

    // Audit trail says executed; the bus got a completion event
    let logs = ScheduleRepo::logs(&fleet.pool, &id).await.expect("logs");
    assert_eq!(logs.last().expect("entries").action, "executed");

    let event = tokio::time::timeout(WAIT, events.recv()).await.expect("event in time");
    match event {
        Some(HearthEvent::BackupCompleted { status, backup_id, size_bytes, .. }) => {
            assert_eq!(status, "completed");
            assert_eq!(backup_id.as_ref().map(|b| b.as_str()), Some(backups[0].id.as_str()));
            assert_eq!(size_bytes, backups[0].size_bytes as u64);
        }
        other => panic!("unexpected event {other:?}"),
    }

    fleet.supervisor.stop(&id, true).await.expect("cleanup");
}
