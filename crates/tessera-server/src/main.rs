//! Tessera Server — Application entry point.

use tessera_store::{StoreConfig, StoreManager, run_migrations};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tessera=info".parse().unwrap()),
        )
        .json()
        .init();

    info!("Starting Tessera server...");

    let config = StoreConfig::from_env();
    let store = match StoreManager::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to the store");
            std::process::exit(1);
        }
    };

    if let Err(e) = store.ping().await {
        tracing::error!(error = %e, "Store connection is not usable");
        std::process::exit(1);
    }

    if let Err(e) = run_migrations(store.client()).await {
        tracing::error!(error = %e, "Migration failed");
        std::process::exit(1);
    }
    info!("Migrations applied");

    // TODO: Start REST API server

    info!("Tessera server stopped.");
}
