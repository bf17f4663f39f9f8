mod api;
mod store;

use std::env;
use std::path::PathBuf;

use api::expenses_router;
use common::http::shutdown_signal;
use store::ExpenseStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(5000);
    let db_path = env::var("EXPENSES_DB")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("expenses.redb"));

    let store = ExpenseStore::open(&db_path)?;
    info!("Opened expenses at {:?}", db_path);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, expenses_router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
