// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::pidfile;

fn spec(dir: &Path, java: &Path) -> LaunchSpec {
    LaunchSpec {
        java: java.to_path_buf(),
        memory: MemoryLimits::new(512, 1024),
        cwd: dir.to_path_buf(),
        log_path: dir.join("logs/latest.log"),
        err_path: dir.join("server_error.log"),
        strategy: LaunchStrategy::Direct,
        helper_bin: None,
    }
}

/// A stand-in "java" that prints its argv and sleeps until stdin closes
/// or TERM arrives.
fn write_fake_java(dir: &Path) -> PathBuf {
    let path = dir.join("java");
    std::fs::write(
        &path,
        "#!/bin/sh\ntrap 'exit 0' TERM\necho \"args: $*\"\nwhile read -r line; do\n  [ \"$line\" = stop ] && exit 0\ndone\nwhile :; do sleep 0.1; done\n",
    )
    .unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[test]
fn jvm_args_follow_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec(dir.path(), Path::new("/usr/bin/java"));
    assert_eq!(
        spec.jvm_args(),
        vec!["-Xms512M", "-Xmx1024M", "-jar", "server.jar", "nogui"]
    );
}

#[tokio::test]
async fn direct_launch_writes_pidfile_and_redirects() {
    let root = tempfile::tempdir().unwrap();
    let server_dir = root.path().join("srv");
    std::fs::create_dir_all(&server_dir).unwrap();
    let java = write_fake_java(root.path());

    let launch_spec = spec(&server_dir, &java);
    let mut launched = launch(&launch_spec).await.unwrap();

    assert_eq!(launched.strategy, LaunchStrategy::Direct);
    assert_eq!(pidfile::read(&server_dir).unwrap(), Some(launched.pid));
    assert!(pidfile::pid_alive(launched.pid));
    assert!(launched.stdin.is_some());

    // argv reached the child and stdout landed in the log file
    let log_path = launch_spec.log_path.clone();
    for _ in 0..50 {
        if std::fs::read_to_string(&log_path).map(|s| s.contains("args:")).unwrap_or(false) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("-Xms512M -Xmx1024M -jar server.jar nogui"), "log was: {log}");

    // Closing stdin ends the child ("read" returns EOF, loop breaks on
    // stop only; send stop explicitly)
    use tokio::io::AsyncWriteExt;
    let mut stdin = launched.stdin.take().unwrap();
    stdin.write_all(b"stop\n").await.unwrap();
    drop(stdin);

    let status = launched.child.take().unwrap().wait().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn direct_launch_fails_cleanly_for_missing_binary() {
    let root = tempfile::tempdir().unwrap();
    let server_dir = root.path().join("srv");
    std::fs::create_dir_all(&server_dir).unwrap();

    let launch_spec = spec(&server_dir, Path::new("/nonexistent/java"));
    let err = launch(&launch_spec).await.unwrap_err();
    assert!(matches!(err, LaunchError::Spawn(_)));

    // No stale pid file on failure
    assert_eq!(pidfile::read(&server_dir).unwrap(), None);
}

#[tokio::test]
async fn double_fork_preference_falls_back_to_direct() {
    let root = tempfile::tempdir().unwrap();
    let server_dir = root.path().join("srv");
    std::fs::create_dir_all(&server_dir).unwrap();
    let java = write_fake_java(root.path());

    // Point the helper at a binary that is not a hearthd, so the
    // double-fork path fails and the fallback engages.
    let mut launch_spec = spec(&server_dir, &java);
    launch_spec.strategy = LaunchStrategy::DoubleFork;
    launch_spec.helper_bin = Some(PathBuf::from("/bin/false"));

    let launched = launch(&launch_spec).await.unwrap();
    assert_eq!(launched.strategy, LaunchStrategy::Direct);
    assert!(pidfile::pid_alive(launched.pid));

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(launched.pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();
}
