// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! hearthd, the Hearth supervisor daemon.
//!
//! `hearthd` runs the supervisor until SIGINT/SIGTERM. Invoked as
//! `hearthd __launch ...` it instead acts as the short-lived launch
//! intermediate (see `launcher::helper`) and must do its work before any
//! runtime machinery exists.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hearth_daemon::app::App;
use hearth_daemon::env::DaemonConfig;
use hearth_daemon::jar::{FileCopyProvider, JarProvider, PlaceholderProvider};
use hearth_daemon::launcher::helper;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Launch-intermediate mode: plain std, no runtime, exit immediately.
    if args.get(1).map(String::as_str) == Some(helper::LAUNCH_ARG) {
        return ExitCode::from(helper::run(&args[2..]) as u8);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("hearthd: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run_daemon()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon exited with error");
            eprintln!("hearthd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_daemon() -> Result<(), Box<dyn std::error::Error>> {
    let config = DaemonConfig::from_env()?;
    // Keep the guard alive so the background log writer flushes on exit
    let _log_guard = init_tracing(&config);

    let jar_provider = jar_provider_from_env();
    let app = App::start(config, jar_provider).await?;

    wait_for_signal().await;
    // JVMs survive; the next boot re-adopts them. HEARTHD_STOP_ALL=1
    // opts into stopping the fleet instead.
    let stop_all = matches!(
        std::env::var("HEARTHD_STOP_ALL").as_deref(),
        Ok("1") | Ok("true")
    );
    app.shutdown(stop_all).await;
    Ok(())
}

/// Jar cache directory from `JAR_CACHE_DIR`; without one, servers get a
/// placeholder jar and the operator installs the real binary.
fn jar_provider_from_env() -> Arc<dyn JarProvider> {
    match std::env::var("JAR_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => Arc::new(FileCopyProvider::new(dir)),
        _ => Arc::new(PlaceholderProvider),
    }
}

/// Log to stderr and to `<servers_root>/hearthd.log` via a non-blocking
/// daily-rotated appender.
fn init_tracing(config: &DaemonConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if std::fs::create_dir_all(&config.servers_root).is_ok() {
        let appender = tracing_appender::rolling::daily(&config.servers_root, "hearthd.log");
        let (file_writer, guard) = tracing_appender::non_blocking(appender);
        builder.with_writer(file_writer.and(std::io::stderr)).init();
        Some(guard)
    } else {
        builder.init();
        None
    }
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = term.recv() => info!("SIGTERM received"),
    }
}
