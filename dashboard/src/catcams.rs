use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

use lib_catcams::{
    Dashboard, FileSessionStore, HeadlessPlatform, HostEvent, IdentityGate, StreamManager, StreamSettings,
    WhepSignaling,
};

mod catcams_logic;
use catcams_logic::console::{self, ConsoleProvider, ConsoleSurface};
use catcams_logic::{config, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = config::load_config()?;
    logger::setup_logging(&app_config.log_dir, &app_config.log_level)?;

    let dashboard_config = app_config.dashboard;
    log::info!(
        "Starting catcams for {} cameras against {} ({:?})",
        dashboard_config.cameras.len(),
        dashboard_config.media_base_url,
        dashboard_config.lifecycle
    );

    let console = Arc::new(ConsoleSurface::default());
    let store = Arc::new(FileSessionStore::new(dashboard_config.session_path()));
    let gate = Arc::new(IdentityGate::new(
        &dashboard_config,
        store,
        Arc::new(ConsoleProvider),
        console.clone(),
    ));

    let settings = StreamSettings::from_config(&dashboard_config)?;
    let platform = Arc::new(HeadlessPlatform::new(settings.endpoints.base())?);
    let signaling = Arc::new(WhepSignaling::new(&settings.endpoints, dashboard_config.signaling_retries)?);
    let manager = StreamManager::new(settings, platform, signaling, console.clone());

    let (events_tx, events_rx) = mpsc::channel::<HostEvent>(32);
    tokio::spawn(console::read_commands(events_tx.clone(), console.clone()));
    tokio::spawn(forward_shutdown(events_tx));

    Dashboard::new(gate, manager, console).run(events_rx).await;

    log::info!("Shutdown complete.");
    Ok(())
}

/// Turns Ctrl-C / SIGTERM into a `Shutdown` host event.
async fn forward_shutdown(events: mpsc::Sender<HostEvent>) {
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
                        log::warn!("Could not install SIGTERM handler: {}", e);
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
    }
    let _ = events.send(HostEvent::Shutdown).await;
}
