// LabJack hardware port
//
// The stateframe core only consumes already collected monitor records.
// Everything that talks to a device goes through the `LabJack` trait so
// the polling side can run against a simulated register file.

pub mod device;
pub mod ovro;
pub mod sim;

pub use device::{attenuator_code, AntennaLj, LoNoiseLj, StarburstLj};
pub use ovro::{DevicesConfig, OvroStarburst};
pub use sim::{SimConnector, SimLabJack};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Unable to connect to {selector}: {reason}")]
    DeviceNotFound { selector: String, reason: String },

    #[error("There is no connection to device {0}")]
    NotConnected(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid LO frequency code: {0}")]
    InvalidLoFrequency(u32),

    #[error("Invalid device name {0:?}: at most 49 characters and no periods")]
    InvalidName(String),

    #[error("Band {0} is unavailable")]
    InvalidBand(u32),

    #[error("Antenna {0} is not configured")]
    NoAntenna(AntennaId),

    #[error("Driver error on {register}: {reason}")]
    Driver { register: String, reason: String },
}

/// Named-register access to one open LabJack.
pub trait LabJack: Send {
    fn read_name(&mut self, name: &str) -> Result<f64>;

    fn read_name_string(&mut self, name: &str) -> Result<String>;

    fn write_name(&mut self, name: &str, value: f64) -> Result<()>;

    fn write_name_string(&mut self, name: &str, value: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens devices. Fails with `DeviceNotFound` when nothing matches.
pub trait Connector: Send + Sync {
    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn LabJack>>;
}

/// Which LabJack to open: device type, link and identifier (serial number,
/// IP address or device name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelector {
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default = "default_connection_type")]
    pub connection_type: String,
    pub identifier: String,
}

fn default_device_type() -> String {
    "T7".to_string()
}

fn default_connection_type() -> String {
    "ETHERNET".to_string()
}

impl DeviceSelector {
    pub fn new(identifier: &str) -> Self {
        Self {
            device_type: default_device_type(),
            connection_type: default_connection_type(),
            identifier: identifier.to_string(),
        }
    }

    pub fn any() -> Self {
        Self::new("ANY")
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} via {}",
            self.device_type, self.identifier, self.connection_type
        )
    }
}

/// LO band setting, stored as its two-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum LoFrequency {
    Lo3_4GHz,
    Lo7_5GHz,
    Lo11_5GHz,
    Lo15_5GHz,
}

impl LoFrequency {
    pub const ALL: [LoFrequency; 4] = [
        LoFrequency::Lo3_4GHz,
        LoFrequency::Lo7_5GHz,
        LoFrequency::Lo11_5GHz,
        LoFrequency::Lo15_5GHz,
    ];

    pub fn code(self) -> u32 {
        match self {
            LoFrequency::Lo3_4GHz => 0,
            LoFrequency::Lo7_5GHz => 1,
            LoFrequency::Lo11_5GHz => 2,
            LoFrequency::Lo15_5GHz => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LoFrequency::Lo3_4GHz => "LO_3_4GHZ",
            LoFrequency::Lo7_5GHz => "LO_7_5GHZ",
            LoFrequency::Lo11_5GHz => "LO_11_5GHZ",
            LoFrequency::Lo15_5GHz => "LO_15_5GHZ",
        }
    }
}

impl TryFrom<u32> for LoFrequency {
    type Error = HardwareError;

    fn try_from(code: u32) -> Result<Self> {
        LoFrequency::ALL
            .into_iter()
            .find(|f| f.code() == code)
            .ok_or(HardwareError::InvalidLoFrequency(code))
    }
}

impl From<LoFrequency> for u32 {
    fn from(freq: LoFrequency) -> u32 {
        freq.code()
    }
}

/// One of the four attenuated IF paths of an antenna board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Component {
    Vq,
    Vi,
    Hq,
    Hi,
}

impl Component {
    pub const ALL: [Component; 4] = [Component::Vq, Component::Vi, Component::Hq, Component::Hi];

    /// Digital line that latches the attenuator code into this path.
    pub fn latch(self) -> &'static str {
        match self {
            Component::Vq => "CIO0",
            Component::Vi => "CIO1",
            Component::Hq => "CIO2",
            Component::Hi => "CIO3",
        }
    }

    /// Monitor key of this path's attenuation.
    pub fn atten_key(self) -> &'static str {
        match self {
            Component::Vq => "VQATTEN",
            Component::Vi => "VIATTEN",
            Component::Hq => "HQATTEN",
            Component::Hi => "HIATTEN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Polarization {
    H,
    V,
}

impl Polarization {
    pub const BOTH: [Polarization; 2] = [Polarization::H, Polarization::V];

    /// Source select line: 0 = antenna, 1 = noise source.
    pub fn select_line(self) -> &'static str {
        match self {
            Polarization::H => "EIO1",
            Polarization::V => "EIO2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AntennaId {
    A,
    B,
}

impl AntennaId {
    pub const BOTH: [AntennaId; 2] = [AntennaId::A, AntennaId::B];

    /// Top-level key of this antenna's record in the monitor data.
    pub fn key(self) -> &'static str {
        match self {
            AntennaId::A => "A",
            AntennaId::B => "B",
        }
    }
}

impl fmt::Display for AntennaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
