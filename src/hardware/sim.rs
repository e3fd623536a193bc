// In-memory LabJack used by tests and by the daemon when no vendor
// driver is available

use super::{Connector, DeviceSelector, HardwareError, LabJack, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Writes kept for inspection; older ones are dropped.
pub const WRITE_LOG_LEN: usize = 256;

#[derive(Debug, Default)]
struct Registers {
    numeric: HashMap<String, f64>,
    text: HashMap<String, String>,
    writes: VecDeque<(String, f64)>,
    closed: bool,
}

/// Register file shared between clones, so a test can keep one handle for
/// inspection while a device wrapper owns another.
#[derive(Debug, Clone, Default)]
pub struct SimLabJack {
    state: Arc<Mutex<Registers>>,
}

impl SimLabJack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(self, name: &str, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.lock().text.insert(name.to_string(), value.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registers> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, name: &str, value: f64) {
        self.lock().numeric.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.lock().numeric.get(name).copied()
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.lock().text.get(name).cloned()
    }

    /// The last `WRITE_LOG_LEN` numeric writes, oldest first.
    pub fn writes(&self) -> Vec<(String, f64)> {
        self.lock().writes.iter().cloned().collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl LabJack for SimLabJack {
    // Unset registers read as zero, like an idle analog input.
    fn read_name(&mut self, name: &str) -> Result<f64> {
        Ok(self.value(name).unwrap_or(0.0))
    }

    fn read_name_string(&mut self, name: &str) -> Result<String> {
        Ok(self.text(name).unwrap_or_default())
    }

    fn write_name(&mut self, name: &str, value: f64) -> Result<()> {
        let mut regs = self.lock();
        regs.numeric.insert(name.to_string(), value);
        if regs.writes.len() == WRITE_LOG_LEN {
            regs.writes.pop_front();
        }
        regs.writes.push_back((name.to_string(), value));
        Ok(())
    }

    fn write_name_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.lock().text.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Hands out simulated devices by identifier.
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    devices: HashMap<String, SimLabJack>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, identifier: &str, device: SimLabJack) -> Self {
        self.devices.insert(identifier.to_string(), device);
        self
    }

    pub fn device(&self, identifier: &str) -> Option<&SimLabJack> {
        self.devices.get(identifier)
    }

    /// Connector whose devices report nominal supply voltages and
    /// temperatures, one per identifier.
    pub fn nominal(identifiers: &[&str]) -> Self {
        identifiers
            .iter()
            .enumerate()
            .fold(Self::new(), |conn, (i, id)| {
                conn.with_device(id, nominal_board(id, 470_010_000 + i as u32))
            })
    }
}

fn nominal_board(name: &str, serial: u32) -> SimLabJack {
    SimLabJack::new()
        .with_text("DEVICE_NAME_DEFAULT", name)
        .with_register("SERIAL_NUMBER", serial as f64)
        .with_register("TEMPERATURE_DEVICE_K", 300.0)
        .with_register("TEMPERATURE_AIR_K", 295.0)
        .with_register("AIN4", 8.0)
        .with_register("AIN5", 7.5)
        .with_register("AIN6", 6.0)
        .with_register("AIN7", 5.0)
        .with_register("AIN8", 5.0)
        .with_register("AIN9", -5.0)
        .with_register("AIN0", 0.5)
        .with_register("AIN1", 0.5)
        .with_register("AIN2", 0.5)
        .with_register("AIN3", 0.5)
        .with_register("AIN10", 0.6)
        .with_register("AIN11", 0.6)
        .with_register("AIN12", 0.6)
        .with_register("AIN13", 0.6)
}

impl Connector for SimConnector {
    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn LabJack>> {
        let found = if selector.identifier == "ANY" {
            let mut ids: Vec<&String> = self.devices.keys().collect();
            ids.sort();
            ids.first().and_then(|id| self.devices.get(*id))
        } else {
            self.devices.get(&selector.identifier)
        };

        match found {
            Some(device) => {
                device.lock().closed = false;
                Ok(Box::new(device.clone()))
            }
            None => Err(HardwareError::DeviceNotFound {
                selector: selector.to_string(),
                reason: "no such simulated device".to_string(),
            }),
        }
    }
}
