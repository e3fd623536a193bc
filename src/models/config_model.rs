use sb_stateframe::hardware::DevicesConfig;
use sb_stateframe::Frame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub name: String,
    pub connection: Connection,
    pub frame: Frame,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub schema: SchemaConfig,
    pub devices: DevicesConfig,
    #[serde(default = "default_bands_path")]
    pub bands_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Connection {
    pub ip: String,
    pub port: u16,
}

/// Where the schema document goes. Unset fields use the frame's defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub path: Option<String>,
    pub archive_dir: Option<String>,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_bands_path() -> String {
    ".bands.json".to_string()
}
