use anyhow::Result;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use lib_autosplit::driver::{ConnectionStateMachine, PollScheduler, SchedulerSettings};
use lib_autosplit::protocol::Usb2SnesClient;

mod splitter_logic;
use splitter_logic::{config, console_host, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    logger::setup_logging(
        &config.log_dir.clone().unwrap_or_else(|| "./logs".into()),
        config.log_level.as_deref().unwrap_or("info"),
    )?;

    let url = config
        .url
        .clone()
        .unwrap_or_else(|| lib_autosplit::protocol::DEFAULT_URL.to_string());
    let client = Arc::new(Usb2SnesClient::new(url));

    if config.detect {
        return detect(&client).await;
    }

    log::info!(
        "autosplitter {} (engine {}) using {}",
        env!("CARGO_PKG_VERSION"),
        lib_autosplit::ENGINE_VERSION,
        client.url()
    );
    if config.game_config.is_none() {
        log::warn!("No game configuration set (--game-config); only connecting.");
    }

    let host = Arc::new(console_host::ConsoleHost::new(&config));
    let connection = Arc::new(ConnectionStateMachine::new(
        client,
        config
            .client_name
            .clone()
            .unwrap_or_else(|| "Rust AutoSplitter".to_string()),
    ));
    let settings = SchedulerSettings {
        idle_interval: Duration::from_millis(config.idle_interval_ms.unwrap_or(1000)),
        active_interval: Duration::from_millis(config.active_interval_ms.unwrap_or(33)),
    };
    let scheduler = Arc::new(PollScheduler::new(host.clone(), connection.clone(), settings));

    let (shutdown_tx, mut quit_rx) = tokio::sync::broadcast::channel(1);

    let scheduler_handle = tokio::spawn(scheduler.clone().run(shutdown_tx.subscribe()));
    let mood_handle = tokio::spawn(console_host::report_mood(
        connection.subscribe(),
        shutdown_tx.subscribe(),
    ));
    let commands_handle = tokio::spawn(console_host::read_commands(
        host,
        scheduler,
        shutdown_tx.clone(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
        _ = quit_rx.recv() => {
            log::info!("Quit requested, initiating shutdown.");
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(scheduler_handle, mood_handle);
    // A blocked stdin read never returns on its own.
    commands_handle.abort();

    log::info!("Shutdown complete.");
    Ok(())
}

/// `--detect`: list what the server offers and exit.
async fn detect(client: &Usb2SnesClient) -> Result<()> {
    if !client.connect().await {
        anyhow::bail!("No QUsb2Snes server reachable at {}", client.url());
    }

    let devices = client.device_list().await?;
    if devices.is_empty() {
        println!("{}", "No devices found.".bright_yellow());
    }
    for device in &devices {
        println!("{} {}", "device:".truecolor(128, 128, 128), device.bright_green());
    }

    client.disconnect().await;
    Ok(())
}
