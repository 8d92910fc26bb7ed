// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: logging, metrics, session creation and the run itself

use crate::config::{ConfigError, Settings};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use warden_adapters::{
    ConsulSession, LockObserver, MetricsObserver, NoOpObserver, SessionError, TracedSession,
};
use warden_core::SystemClock;
use warden_engine::{ready_channel, LockCoordinator, LockError, Ready};

/// Exit code after a clean shutdown
pub const EXIT_OK: u8 = 0;
/// Exit code after the lock was lost
pub const EXIT_LOCK_LOST: u8 = 1;
/// Exit code when startup or configuration failed
pub const EXIT_STARTUP: u8 = 2;

/// Errors that stop wardend
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up logging: {0}")]
    Logging(String),

    #[error("failed to start metrics exporter on {addr}: {message}")]
    Metrics { addr: SocketAddr, message: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifecycleError {
    pub fn exit_code(&self) -> u8 {
        match self {
            LifecycleError::Lock(LockError::LockLost { .. }) => EXIT_LOCK_LOST,
            _ => EXIT_STARTUP,
        }
    }
}

/// Install the global subscriber
///
/// Logs go to stderr unless a log file is configured. The returned guard
/// flushes the file writer and must live as long as the process.
pub fn setup_logging(
    settings: &Settings,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;

    let Some(path) = &settings.log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| LifecycleError::Logging(e.to_string()))?;
        return Ok(None);
    };

    // Create log directory if needed
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| LifecycleError::Logging(format!("not a file: {}", path.display())))?;

    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;

    Ok(Some(guard))
}

/// Serve Prometheus metrics on `addr`
pub fn start_metrics(addr: SocketAddr) -> Result<(), LifecycleError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| LifecycleError::Metrics {
            addr,
            message: e.to_string(),
        })?;
    MetricsObserver::describe();
    info!(%addr, "serving metrics");
    Ok(())
}

/// Completes on SIGTERM or SIGINT
fn shutdown_signal() -> Result<impl Future<Output = ()>, LifecycleError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        }
    })
}

/// Signal ready for the parent process (e.g., systemd, a supervisor)
async fn announce_ready(ready: Ready) {
    if ready.wait().await {
        println!("READY");
    }
}

/// Hold the configured lock until shutdown or loss
pub async fn run(settings: Settings) -> Result<(), LifecycleError> {
    let observer: Arc<dyn LockObserver> = match settings.metrics_listen {
        Some(addr) => {
            start_metrics(addr)?;
            Arc::new(MetricsObserver::new())
        }
        None => Arc::new(NoOpObserver::new()),
    };

    // A signal during session creation must not kill the process
    let shutdown = shutdown_signal()?;

    info!(
        key = settings.lock.identity.key(),
        value = %settings.lock.identity.value_lossy(),
        consul = %settings.consul.address,
        "starting wardend"
    );

    let session = ConsulSession::create(settings.consul.clone()).await?;
    info!(session = session.id(), "session created");

    let (signal, ready) = ready_channel();
    tokio::spawn(announce_ready(ready));

    let coordinator = LockCoordinator::new(
        TracedSession::new(session),
        settings.lock,
        observer,
        SystemClock,
    );
    coordinator.run(shutdown, signal).await?;

    info!("wardend stopped");
    Ok(())
}
