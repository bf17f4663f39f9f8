use std::env;
use std::path::PathBuf;

use store::Store;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_path = env::args()
        .nth(1)
        .or_else(|| env::var("DATA_PATH").ok())
        .unwrap_or_else(|| "data.redb".to_string());

    let store = Store::open(&PathBuf::from(&data_path))?;
    let snapshot = store.snapshot()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
