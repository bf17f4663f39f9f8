use std::env;
use std::path::PathBuf;

use store::{read_legacy_json, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let json_path = args
        .next()
        .or_else(|| env::var("LEGACY_DB").ok())
        .ok_or("LEGACY_DB not set and no path argument")?;
    let data_path = args
        .next()
        .or_else(|| env::var("DATA_PATH").ok())
        .unwrap_or_else(|| "data.redb".to_string());

    let snapshot = read_legacy_json(&PathBuf::from(&json_path));
    info!("Read {:?}", json_path);
    let store = Store::open(&PathBuf::from(&data_path))?;
    let stats = store.import_snapshot(&snapshot)?;

    println!(
        "Imported: {} play counts, {} metadata entries into {}",
        stats.plays, stats.metadata, data_path
    );

    Ok(())
}
