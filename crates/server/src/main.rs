mod api;
mod config;
mod covers;
mod scan;
mod state;

use std::sync::Arc;

use api::app_router;
use common::http::shutdown_signal;
use config::{apply_port_override, config_path_from_env, load_or_create_config, resolve_path};
use covers::CoverWriter;
use metadata::LoftyExtractor;
use state::AppState;
use store::Store;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (mut config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    apply_port_override(&mut config, std::env::var("PORT").ok());

    let data_path = resolve_path(&config_path, &config.data_path);
    let store = Store::open(&data_path)?;
    info!("Opened store at {:?}", data_path);

    let uploads_dir = resolve_path(&config_path, &config.uploads_path);
    std::fs::create_dir_all(&uploads_dir)?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let origins = config.allowed_origins.join(", ");
    let state = AppState {
        store,
        extractor: Arc::new(LoftyExtractor),
        covers: CoverWriter::new(uploads_dir),
        config: Arc::new(config),
    };
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    info!("Allowed origins: {}", origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
