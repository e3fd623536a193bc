// LabJack module wrappers: generic board, LO/noise source, antenna

use super::{
    Component, Connector, DeviceSelector, HardwareError, LabJack, LoFrequency, Polarization,
    Result,
};
use crate::core::constants::{ATTEN_DEFAULT_DB, NAME_LEN};
use crate::core::value::{MonitorRecord, RawValue};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const REBOOT_REGISTER: &str = "SYSTEM_REBOOT";
const REBOOT_KEY: f64 = 0x4C4A_0000 as f64;
const NAME_REGISTER: &str = "DEVICE_NAME_DEFAULT";

/// Raw register reading -> physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Raw,
    /// `gain * raw + offset`
    Linear { gain: f64, offset: f64 },
}

impl Conversion {
    const fn scale(gain: f64) -> Self {
        Conversion::Linear { gain, offset: 0.0 }
    }

    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Conversion::Raw => raw,
            Conversion::Linear { gain, offset } => gain * raw + offset,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub register: &'static str,
    pub conversion: Conversion,
}

const fn param(key: &'static str, register: &'static str, conversion: Conversion) -> ParamSpec {
    ParamSpec {
        key,
        register,
        conversion,
    }
}

/// Board health readings every module reports. `NAME` is read separately
/// as a string register.
pub const GENERIC_PARAMS: &[ParamSpec] = &[
    param("LJTEMP", "TEMPERATURE_DEVICE_K", Conversion::Raw),
    param("LJAIRTEMP", "TEMPERATURE_AIR_K", Conversion::Raw),
    param("POW_24V", "AIN4", Conversion::scale(3.0)),
    param("POW_15V", "AIN5", Conversion::scale(2.0)),
    param("POW_12V", "AIN6", Conversion::scale(2.0)),
    param("POW_5V", "AIN7", Conversion::Raw),
    param("POW_N5V", "AIN9", Conversion::Raw),
    param("POW_S5V", "AIN8", Conversion::Raw),
    param("SERIAL", "SERIAL_NUMBER", Conversion::Raw),
];

pub const GENERIC_KEYS: &[&str] = &[
    "LJTEMP", "LJAIRTEMP", "POW_24V", "POW_15V", "POW_12V", "POW_5V", "POW_N5V", "NAME",
    "POW_S5V", "SERIAL",
];

const IF_POWER: Conversion = Conversion::Linear {
    gain: -40.0,
    offset: 24.0,
};
const IF_TEMP: Conversion = Conversion::Linear {
    gain: 478.0,
    offset: -267.0,
};

/// Antenna board readings. Attenuations come from the ghost copy, not a
/// register, since the attenuators cannot be read back.
pub const ANTENNA_PARAMS: &[ParamSpec] = &[
    param("VQPOW", "AIN3", IF_POWER),
    param("VIPOW", "AIN2", IF_POWER),
    param("HQPOW", "AIN1", IF_POWER),
    param("HIPOW", "AIN0", IF_POWER),
    param("VQTEMP", "AIN13", IF_TEMP),
    param("VITEMP", "AIN12", IF_TEMP),
    param("HQTEMP", "AIN11", IF_TEMP),
    param("HITEMP", "AIN10", IF_TEMP),
    param("VNSSEL", "EIO2", Conversion::Raw),
    param("HNSSEL", "EIO1", Conversion::Raw),
];

pub const ANTENNA_KEYS: &[&str] = &[
    "VQPOW", "VIPOW", "HQPOW", "HIPOW", "VQTEMP", "VITEMP", "HQTEMP", "HITEMP", "VQATTEN",
    "VIATTEN", "HQATTEN", "HIATTEN", "VNSSEL", "HNSSEL",
];

pub const LONOISE_KEYS: &[&str] = &["LOFREQ", "NSSTAT"];

/// A generic Starburst LabJack board.
pub struct StarburstLj {
    selector: DeviceSelector,
    handle: Option<Box<dyn LabJack>>,
}

impl StarburstLj {
    pub fn connect(connector: &dyn Connector, selector: DeviceSelector) -> Result<Self> {
        let handle = connector.open(&selector)?;
        debug!("Connected to {}", selector);
        Ok(Self {
            selector,
            handle: Some(handle),
        })
    }

    pub fn from_handle(selector: DeviceSelector, handle: Box<dyn LabJack>) -> Self {
        Self {
            selector,
            handle: Some(handle),
        }
    }

    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Close the device. Close errors are logged and otherwise ignored; the
    /// board counts as disconnected afterwards either way.
    pub fn disconnect(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                warn!("Close of {} failed: {}", self.selector, e);
            }
        }
    }

    pub fn reboot(&mut self) -> Result<()> {
        self.device()?.write_name(REBOOT_REGISTER, REBOOT_KEY)
    }

    /// Takes effect after a reboot.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let device = self.device()?;
        if name.chars().count() > NAME_LEN as usize || name.contains('.') {
            return Err(HardwareError::InvalidName(name.to_string()));
        }
        device.write_name_string(NAME_REGISTER, name)
    }

    pub(crate) fn device(&mut self) -> Result<&mut Box<dyn LabJack>> {
        let identifier = &self.selector.identifier;
        self.handle
            .as_mut()
            .ok_or_else(|| HardwareError::NotConnected(identifier.clone()))
    }

    /// Read the generic parameter `key`; `None` when `key` is not one.
    fn read_generic(&mut self, key: &str) -> Result<Option<RawValue>> {
        if key == "NAME" {
            let name = self.device()?.read_name_string(NAME_REGISTER)?;
            return Ok(Some(RawValue::Text(name)));
        }
        match GENERIC_PARAMS.iter().find(|p| p.key == key) {
            Some(spec) => {
                let raw = self.device()?.read_name(spec.register)?;
                Ok(Some(RawValue::Float(spec.conversion.apply(raw))))
            }
            None => Ok(None),
        }
    }

    pub fn get_params(&mut self, keys: &[&str]) -> Result<MonitorRecord> {
        self.device()?;
        let mut record = MonitorRecord::new();
        for key in keys {
            let value = self
                .read_generic(key)?
                .ok_or_else(|| HardwareError::UnknownParameter(key.to_string()))?;
            record.insert(key.to_string(), value);
        }
        Ok(record)
    }

    pub fn monitor(&mut self) -> Result<MonitorRecord> {
        self.get_params(GENERIC_KEYS)
    }
}

/// LO / noise source board. LO band is two bits on EIO3 (low) and EIO4
/// (high); the noise source is switched by EIO0.
pub struct LoNoiseLj {
    base: StarburstLj,
}

impl LoNoiseLj {
    pub fn new(base: StarburstLj) -> Self {
        Self { base }
    }

    pub fn base_mut(&mut self) -> &mut StarburstLj {
        &mut self.base
    }

    pub fn lo_frequency(&mut self) -> Result<LoFrequency> {
        let device = self.base.device()?;
        let low = device.read_name("EIO3")?;
        let high = device.read_name("EIO4")?;
        LoFrequency::try_from(high as u32 * 2 + low as u32)
    }

    pub fn set_lo_frequency(&mut self, freq: LoFrequency) -> Result<()> {
        let code = freq.code();
        let device = self.base.device()?;
        device.write_name("EIO3", (code & 1) as f64)?;
        device.write_name("EIO4", (code >> 1 & 1) as f64)
    }

    pub fn set_noise_source(&mut self, on: bool) -> Result<()> {
        self.base
            .device()?
            .write_name("EIO0", if on { 1.0 } else { 0.0 })
    }

    pub fn noise_source(&mut self) -> Result<f64> {
        self.base.device()?.read_name("EIO0")
    }

    pub fn get_params(&mut self, keys: &[&str]) -> Result<MonitorRecord> {
        self.base.device()?;
        let mut record = MonitorRecord::new();
        for key in keys {
            let value = match *key {
                "LOFREQ" => {
                    let freq = self.lo_frequency()?;
                    RawValue::from((freq.label(), freq.code() as i64))
                }
                "NSSTAT" => RawValue::Float(self.noise_source()?),
                other => self
                    .base
                    .read_generic(other)?
                    .ok_or_else(|| HardwareError::UnknownParameter(other.to_string()))?,
            };
            record.insert(key.to_string(), value);
        }
        Ok(record)
    }

    pub fn monitor(&mut self) -> Result<MonitorRecord> {
        let keys: Vec<&str> = GENERIC_KEYS.iter().chain(LONOISE_KEYS).copied().collect();
        self.get_params(&keys)
    }

    pub fn disconnect(&mut self) {
        self.base.disconnect();
    }
}

/// Attenuator code for a requested level: the next 0.5 dB step at or above
/// `level`, floored at 0 and capped at 63 (31.5 dB).
pub fn attenuator_code(level: f64) -> u8 {
    if level > 31.0 {
        63
    } else if level < 0.0 {
        0
    } else {
        (level * 2.0).ceil() as u8
    }
}

/// Dual-polarization antenna board with four programmable attenuators.
pub struct AntennaLj {
    base: StarburstLj,
    attenuation: BTreeMap<Component, f64>,
}

impl AntennaLj {
    /// Wraps `base` and drives every attenuator to its maximum.
    pub fn new(base: StarburstLj) -> Result<Self> {
        let mut antenna = Self {
            base,
            attenuation: Component::ALL
                .iter()
                .map(|c| (*c, ATTEN_DEFAULT_DB))
                .collect(),
        };
        antenna.set_attenuator(ATTEN_DEFAULT_DB, &Component::ALL)?;
        Ok(antenna)
    }

    pub fn base_mut(&mut self) -> &mut StarburstLj {
        &mut self.base
    }

    /// Last level written to `component`.
    pub fn attenuation(&self, component: Component) -> f64 {
        self.attenuation
            .get(&component)
            .copied()
            .unwrap_or(ATTEN_DEFAULT_DB)
    }

    /// Returns the level actually set.
    pub fn set_attenuator(&mut self, level: f64, components: &[Component]) -> Result<f64> {
        let code = attenuator_code(level);
        let device = self.base.device()?;
        // code bits on FIO0..FIO5, LSB first
        for bit in 0..6 {
            device.write_name(&format!("FIO{}", bit), ((code >> bit) & 1) as f64)?;
        }

        let applied = code as f64 / 2.0;
        for component in components {
            device.write_name(component.latch(), 1.0)?;
            for c in Component::ALL {
                device.write_name(c.latch(), 0.0)?;
            }
            self.attenuation.insert(*component, applied);
        }
        debug!(
            "{}: attenuation {:?} -> {} dB",
            self.base.selector.identifier, components, applied
        );
        Ok(applied)
    }

    pub fn delta_attenuator(&mut self, delta: f64, components: &[Component]) -> Result<()> {
        for component in components {
            let target = self.attenuation(*component) + delta;
            self.set_attenuator(target, &[*component])?;
        }
        Ok(())
    }

    pub fn select_noise_source(&mut self, pols: &[Polarization]) -> Result<()> {
        self.select_source(pols, 1.0)
    }

    pub fn select_rf_source(&mut self, pols: &[Polarization]) -> Result<()> {
        self.select_source(pols, 0.0)
    }

    fn select_source(&mut self, pols: &[Polarization], value: f64) -> Result<()> {
        let device = self.base.device()?;
        for pol in Polarization::BOTH {
            if pols.contains(&pol) {
                device.write_name(pol.select_line(), value)?;
            }
        }
        Ok(())
    }

    pub fn get_params(&mut self, keys: &[&str]) -> Result<MonitorRecord> {
        self.base.device()?;
        let mut record = MonitorRecord::new();
        for key in keys {
            let value = if let Some(c) = Component::ALL.iter().find(|c| c.atten_key() == *key) {
                RawValue::Float(self.attenuation(*c))
            } else if let Some(spec) = ANTENNA_PARAMS.iter().find(|p| p.key == *key) {
                let raw = self.base.device()?.read_name(spec.register)?;
                RawValue::Float(spec.conversion.apply(raw))
            } else {
                self.base
                    .read_generic(key)?
                    .ok_or_else(|| HardwareError::UnknownParameter(key.to_string()))?
            };
            record.insert(key.to_string(), value);
        }
        Ok(record)
    }

    pub fn monitor(&mut self) -> Result<MonitorRecord> {
        let keys: Vec<&str> = GENERIC_KEYS.iter().chain(ANTENNA_KEYS).copied().collect();
        self.get_params(&keys)
    }

    pub fn disconnect(&mut self) {
        self.base.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimLabJack;

    fn board(sim: &SimLabJack) -> StarburstLj {
        StarburstLj::from_handle(DeviceSelector::new("test"), Box::new(sim.clone()))
    }

    #[test]
    fn test_generic_conversions() {
        let sim = SimLabJack::new()
            .with_register("AIN4", 8.0)
            .with_register("AIN5", 7.5)
            .with_register("SERIAL_NUMBER", 470010001.0)
            .with_text("DEVICE_NAME_DEFAULT", "LONoise");
        let mut lj = board(&sim);

        let rec = lj.get_params(&["POW_24V", "POW_15V", "SERIAL", "NAME"]).unwrap();
        assert_eq!(rec["POW_24V"], RawValue::Float(24.0));
        assert_eq!(rec["POW_15V"], RawValue::Float(15.0));
        assert_eq!(rec["SERIAL"].as_i64(), Some(470010001));
        assert_eq!(rec["NAME"], RawValue::from("LONoise"));

        assert!(matches!(
            lj.get_params(&["BOGUS"]),
            Err(HardwareError::UnknownParameter(k)) if k == "BOGUS"
        ));
    }

    #[test]
    fn test_disconnected_operations_fail() {
        let sim = SimLabJack::new();
        let mut lj = board(&sim);
        lj.disconnect();
        assert!(sim.is_closed());
        assert!(!lj.is_connected());
        assert!(matches!(lj.reboot(), Err(HardwareError::NotConnected(id)) if id == "test"));
        assert!(matches!(lj.monitor(), Err(HardwareError::NotConnected(_))));
    }

    #[test]
    fn test_reboot_and_name() {
        let sim = SimLabJack::new();
        let mut lj = board(&sim);
        lj.reboot().unwrap();
        assert_eq!(sim.value("SYSTEM_REBOOT"), Some(1_279_918_080.0));

        lj.set_name("AntennaA").unwrap();
        assert_eq!(sim.text("DEVICE_NAME_DEFAULT").as_deref(), Some("AntennaA"));
        assert!(matches!(lj.set_name("a.b"), Err(HardwareError::InvalidName(_))));
        assert!(lj.set_name(&"x".repeat(50)).is_err());
    }

    #[test]
    fn test_lo_frequency_bits() {
        let sim = SimLabJack::new();
        let mut lo = LoNoiseLj::new(board(&sim));
        lo.set_lo_frequency(LoFrequency::Lo11_5GHz).unwrap();
        assert_eq!(sim.value("EIO3"), Some(0.0));
        assert_eq!(sim.value("EIO4"), Some(1.0));

        let rec = lo.get_params(&["LOFREQ", "NSSTAT"]).unwrap();
        assert_eq!(rec["LOFREQ"], RawValue::from(("LO_11_5GHZ", 2)));
        assert_eq!(rec["NSSTAT"], RawValue::Float(0.0));

        lo.set_noise_source(true).unwrap();
        assert_eq!(sim.value("EIO0"), Some(1.0));
    }

    #[test]
    fn test_attenuator_code_steps() {
        assert_eq!(attenuator_code(10.0), 20);
        assert_eq!(attenuator_code(10.2), 21);
        assert_eq!(attenuator_code(31.5), 63);
        assert_eq!(attenuator_code(45.0), 63);
        assert_eq!(attenuator_code(-2.0), 0);
    }

    #[test]
    fn test_antenna_starts_at_max_attenuation() {
        let sim = SimLabJack::new();
        let ant = AntennaLj::new(board(&sim)).unwrap();
        for c in Component::ALL {
            assert_eq!(ant.attenuation(c), 31.5);
        }
        for bit in 0..6 {
            assert_eq!(sim.value(&format!("FIO{}", bit)), Some(1.0));
        }
    }

    #[test]
    fn test_set_attenuator_writes_code_and_latches() {
        let sim = SimLabJack::new();
        let mut ant = AntennaLj::new(board(&sim)).unwrap();
        sim.clear_writes();

        // 12.5 dB -> code 25 = 0b011001
        let applied = ant.set_attenuator(12.3, &[Component::Hq]).unwrap();
        assert_eq!(applied, 12.5);
        let expected = [1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        for (bit, v) in expected.iter().enumerate() {
            assert_eq!(sim.value(&format!("FIO{}", bit)), Some(*v));
        }

        let writes = sim.writes();
        assert_eq!(writes[6], ("CIO2".to_string(), 1.0));
        assert_eq!(sim.value("CIO2"), Some(0.0));
        assert_eq!(ant.attenuation(Component::Hq), 12.5);
        assert_eq!(ant.attenuation(Component::Vq), 31.5);
    }

    #[test]
    fn test_delta_attenuator_and_params() {
        let sim = SimLabJack::new().with_register("AIN3", 0.5).with_register("AIN13", 0.6);
        let mut ant = AntennaLj::new(board(&sim)).unwrap();
        ant.set_attenuator(10.0, &Component::ALL).unwrap();
        ant.delta_attenuator(-2.5, &[Component::Vq, Component::Vi]).unwrap();
        assert_eq!(ant.attenuation(Component::Vq), 7.5);
        assert_eq!(ant.attenuation(Component::Hi), 10.0);

        let rec = ant.get_params(&["VQPOW", "VQTEMP", "VQATTEN"]).unwrap();
        assert_eq!(rec["VQPOW"], RawValue::Float(4.0));
        let temp = rec["VQTEMP"].as_f64().unwrap();
        assert!((temp - 19.8).abs() < 1e-9);
        assert_eq!(rec["VQATTEN"], RawValue::Float(7.5));
    }

    #[test]
    fn test_source_selection_lines() {
        let sim = SimLabJack::new();
        let mut ant = AntennaLj::new(board(&sim)).unwrap();
        ant.select_noise_source(&[Polarization::H]).unwrap();
        assert_eq!(sim.value("EIO1"), Some(1.0));
        assert_eq!(sim.value("EIO2"), None);

        ant.select_rf_source(&Polarization::BOTH).unwrap();
        assert_eq!(sim.value("EIO1"), Some(0.0));
        assert_eq!(sim.value("EIO2"), Some(0.0));
    }
}
