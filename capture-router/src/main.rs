//! Capture Router - Main entry point
//!
//! Listens for page-bridge connections and runs one capture loop per page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use capture_router::{handle_page_connection, CaptureConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CaptureConfig::load();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting capture router");

    if !config.general.enabled {
        info!("Capture is disabled in configuration, exiting");
        return Ok(());
    }

    let socket_path = config.sockets.bridge_socket_path.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!("Listening for page bridges on {:?}", socket_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let config = config.clone();
                        tokio::spawn(async move {
                            if let Some(state) = handle_page_connection(stream, config).await {
                                info!("page capture finished in state {:?}", state);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }

    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Failed to remove socket file: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}
