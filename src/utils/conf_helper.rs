use crate::models::config_model::MonitorConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::OnceLock;
use tokio::fs;
use tokio::net::TcpListener;
use tracing::info;

static CONFIG_CACHE: OnceLock<MonitorConfig> = OnceLock::new();

const DEFAULT_CONFIG_PATH: &str = "starburst.json";

pub fn config_path() -> String {
    std::env::var("STARBURST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Read the config, bind the listener and cache the config with the port
/// actually bound (port 0 picks a free one).
pub async fn init_config_and_bind() -> Result<TcpListener> {
    let file_path = config_path();

    let data = fs::read_to_string(&file_path)
        .await
        .with_context(|| format!("reading config {}", file_path))?;

    let mut config: MonitorConfig =
        serde_json::from_str(&data).with_context(|| format!("parsing config {}", file_path))?;

    let bind_addr = format!("{}:{}", config.connection.ip, config.connection.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    let actual_port = listener.local_addr()?.port();
    config.connection.port = actual_port;

    CONFIG_CACHE
        .set(config)
        .map_err(|_| anyhow!("Config already initialized"))?;

    info!("Config initialized from {} on port {}", file_path, actual_port);

    Ok(listener)
}

pub fn get_cached_config() -> Result<&'static MonitorConfig> {
    CONFIG_CACHE
        .get()
        .ok_or_else(|| anyhow!("Config not initialized"))
}
