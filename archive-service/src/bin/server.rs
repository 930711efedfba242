//! Archive server binary.

use archive_service::{ArchiveServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = ServerConfig::default();
    info!("Database: {:?}", config.db_path);

    let server = ArchiveServer::new(config)?;
    server.run().await
}
