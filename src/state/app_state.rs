use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use sb_stateframe::bands::BandStore;
use sb_stateframe::hardware::{Connector, OvroStarburst};
use sb_stateframe::OffsetTable;

use crate::models::config_model::MonitorConfig;

/// Latest assembled frame.
#[derive(Clone, Default)]
pub struct Snapshot {
    pub buffer: Vec<u8>,
    pub format: String,
    /// LabVIEW seconds of the poll that produced this frame.
    pub timestamp: f64,
    pub sequence: u64,
    /// Last hardware error; the frame then carries defaults.
    pub hardware_error: Option<String>,
}

/// Schema emitted on the first poll, with its decoded offset table.
#[derive(Clone)]
pub struct SchemaInfo {
    pub xml: String,
    pub table: OffsetTable,
}

#[derive(Clone)]
pub struct AppState {
    pub config: &'static MonitorConfig,
    pub snapshot: Arc<RwLock<Snapshot>>,
    pub schema: Arc<RwLock<Option<SchemaInfo>>>,
    // Held across blocking hardware calls, hence `blocking_lock` in pollers.
    pub system: Arc<Mutex<Option<OvroStarburst>>>,
    pub connector: Arc<dyn Connector>,
    pub bands: BandStore,
}

impl AppState {
    pub fn new(config: &'static MonitorConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            schema: Arc::new(RwLock::new(None)),
            system: Arc::new(Mutex::new(None)),
            connector,
            bands: BandStore::new(&config.bands_path),
        }
    }
}
