//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Hosts the reminder scheduler as a background process. The native shell
//! sends `CommandEnvelope` lines on stdin and receives `ResponseEnvelope`
//! and `EventEnvelope` lines on stdout, including `notification.show`
//! events it must turn into OS notifications.
//!
//! All tracing/diagnostic output goes to stderr (and optionally a daily log
//! file) so that stdout remains a clean JSON protocol channel.

use alarmd::AlarmConfig;
use alarmd::config::LoggingConfig;
use alarmd::host::stdio::run_stdio_bridge;
use alarmd::scheduler::{ChannelPresenter, JsonFileReminderStore, SchedulerCore, SchedulerService};
use anyhow::Context;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "alarmd-host.log";

fn init_tracing(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let (file_layer, guard) = if logging.file {
        let log_dir = alarmd::alarm_dirs::logs_dir();
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("alarmd=debug,info"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = AlarmConfig::default_config_path();
    let config = AlarmConfig::load_or_default(&config_path)
        .with_context(|| format!("cannot load config from {}", config_path.display()))?;

    let _log_guard = init_tracing(&config.logging);

    let store_path = config.store.effective_path();
    tracing::info!(
        config = %config_path.display(),
        store = %store_path.display(),
        "alarmd-host starting"
    );

    let store = JsonFileReminderStore::new(store_path);
    let (presenter, notifications) = ChannelPresenter::channel();
    let (core, timer_rx) = SchedulerCore::new(store, presenter, &config);
    let (handle, service) = SchedulerService::new(core, timer_rx, config.host.request_capacity);
    let service_task = tokio::spawn(service.run());

    run_stdio_bridge(handle, notifications, &config.host)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "alarmd-host exited with error");
            anyhow::anyhow!("alarmd-host failed: {e}")
        })?;

    // The bridge owned the last scheduler handle; the service drains and stops.
    service_task.await.context("scheduler service panicked")?;

    tracing::info!("alarmd-host shut down cleanly");
    Ok(())
}
