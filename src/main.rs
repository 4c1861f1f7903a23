use std::sync::Arc;

use clap::Parser;
use inventario::{
    api::{self, AppState},
    config::{CliArgs, Config, LoggingConfig},
    storage,
};
use inventario_core::Inventory;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config.logging);

    let database = config.database.clone();
    let storage = tokio::task::spawn_blocking(move || storage::open_storage(&database)).await??;
    let inventory = Arc::new(Inventory::new(storage, config.api.max_page_size));

    let app = api::router(
        AppState::new(inventory.clone(), &config.api),
        api::cors_layer(&config.cors)?,
    );

    let addr = config.listen_addr()?;
    tracing::info!(%addr, origin = %config.cors.allowed_origin, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the storage handle off the async workers.
    tokio::task::spawn_blocking(move || drop(inventory)).await?;
    tracing::info!("Storage closed");
    Ok(())
}
