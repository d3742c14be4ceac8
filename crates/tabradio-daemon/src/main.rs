mod core;
mod player;
mod session;
mod socket;
#[cfg(test)]
mod testing;

use anyhow::Context;
use tabradio_proto::config::Config;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{DaemonCore, DaemonEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging; the host owns our stdio.
    let data_dir = tabradio_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tabradio_daemon=debug")
            }),
        )
        .init();

    eprintln!("tabradio-daemon: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = match Config::load() {
        Ok(config) => {
            info!("Config loaded from: {:?}", Config::config_path());
            config
        }
        Err(e) => {
            warn!("Config unusable ({:#}), running with defaults", e);
            Config::default()
        }
    };

    let addr = format!("{}:{}", config.daemon.bind_address, config.daemon.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding command socket {} (is another daemon running?)", addr))?;

    // All external inputs funnel into DaemonCore.
    let (event_tx, event_rx) = mpsc::channel::<DaemonEvent>(64);

    let _socket_handle = socket::start_server(listener, event_tx.clone());

    let signal_tx = event_tx;
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination signal received");
        let _ = signal_tx.send(DaemonEvent::Shutdown).await;
    });

    let daemon_core = DaemonCore::from_config(&config);
    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    info!("Daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot watch SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot watch Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
