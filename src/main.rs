use std::time::Duration;

use sysml_model_store::api::handlers::ModelStoreState;
use sysml_model_store::api::routes::build_app;
use sysml_model_store::config::{AppConfig, StoreBackend};
use sysml_model_store::seed;
use sysml_model_store::store::{MemoryStore, PostgresStore, Store};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    log::info!("SysML v2 model store");

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={} backend={:?}",
        config.server_address(),
        config.store.backend
    );

    match config.store.backend {
        StoreBackend::Memory => run_server(MemoryStore::new(), &config).await,
        StoreBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;

            log::info!("Running database migrations...");
            store.migrate().await?;

            run_server(store, &config).await
        }
    }
}

async fn run_server<S: Store + 'static>(store: S, config: &AppConfig) -> anyhow::Result<()> {
    // Load seed data for demonstration (optional)
    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        let project = seed::load_seed_data(&store).await?;
        log::info!("Seed project '{}' created as {}", project.name, project.id);
    }

    let state = ModelStoreState::new(store, config.commit.max_retries);
    let app = build_app(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Model store listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", err);
    }
    log::info!("Shutting down");
}
