//! Taskwell daemon - task backend with update lifecycle management.

use anyhow::Result;
use taskwell_common::config::Config;
use taskwell_common::Store;
use taskwelld::server::{self, AppState};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Taskwell daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    let store = Store::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path);

    let state = AppState::new(store, config);
    server::run(state).await?;

    info!("Shutting down gracefully");
    Ok(())
}
