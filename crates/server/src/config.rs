use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub data_path: String,
    pub uploads_path: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "https://elara-frontend.vercel.app".to_string(),
            ],
            data_path: "data.redb".to_string(),
            uploads_path: "uploads".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("ELARA_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.host.trim().is_empty() {
            config.host = "0.0.0.0".to_string();
        }
        if config.port == 0 {
            config.port = 3000;
        }
        if config.data_path.trim().is_empty() {
            config.data_path = "data.redb".to_string();
        }
        if config.uploads_path.trim().is_empty() {
            config.uploads_path = "uploads".to_string();
        }
        if config.max_upload_bytes == 0 {
            config.max_upload_bytes = DEFAULT_MAX_UPLOAD_BYTES;
        }
        config.allowed_origins.retain(|origin| !origin.trim().is_empty());
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// `PORT` from the environment wins over the file when it parses.
pub fn apply_port_override(config: &mut ServerConfig, value: Option<String>) {
    if let Some(port) = value.and_then(|v| v.trim().parse::<u16>().ok()) {
        if port != 0 {
            config.port = port;
        }
    }
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
