//! Org Structure - organizational hierarchy import and subtree query server.

mod api;
mod bootstrap;
mod config;
mod schema;
mod service;
mod sheet_parser;
mod store;
mod tree_builder;

use std::sync::Arc;

use anyhow::Context;
use api::AppState;
use bootstrap::RowSource;
use config::AppConfig;
use service::NodeService;
use sheet_parser::SpreadsheetSource;
use store::{NodeStore, SqliteNodeStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "org_structure=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!("Configuration: {:?}", config);

    let store: Arc<dyn NodeStore> = Arc::new(
        SqliteNodeStore::open(&config.database_path)
            .with_context(|| format!("Failed to open database {:?}", config.database_path))?,
    );

    // Import the hierarchy before accepting requests
    let source = config
        .source_path
        .clone()
        .map(|path| SpreadsheetSource::new(path, config.columns.clone()));
    let bootstrap_store = store.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        bootstrap::run(source.as_ref().map(|s| s as &dyn RowSource), bootstrap_store.as_ref())
    })
    .await
    .context("Bootstrap task panicked")?;
    info!("Bootstrap finished: {:?}", outcome);

    let state = AppState {
        service: Arc::new(NodeService::new(store)),
        source_path: config.source_path.clone(),
    };
    info!("Store holds {} nodes", state.service.count()?);

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
