// OVRO Starburst system: one LO/noise board and up to two antennas

use super::{
    AntennaId, AntennaLj, Component, Connector, DeviceSelector, HardwareError, LoNoiseLj,
    Polarization, Result, StarburstLj,
};
use crate::bands::{BandPreset, BandTable};
use crate::core::value::{MonitorRecord, RawValue};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub lonoise: DeviceSelector,
    #[serde(default)]
    pub a: Option<DeviceSelector>,
    #[serde(default)]
    pub b: Option<DeviceSelector>,
}

impl DevicesConfig {
    pub fn identifiers(&self) -> Vec<&str> {
        [Some(&self.lonoise), self.a.as_ref(), self.b.as_ref()]
            .into_iter()
            .flatten()
            .map(|s| s.identifier.as_str())
            .collect()
    }
}

pub struct OvroStarburst {
    lonoise: LoNoiseLj,
    a: Option<AntennaLj>,
    b: Option<AntennaLj>,
}

impl OvroStarburst {
    pub fn connect(connector: &dyn Connector, devices: &DevicesConfig) -> Result<Self> {
        let lonoise = LoNoiseLj::new(StarburstLj::connect(connector, devices.lonoise.clone())?);
        let open_antenna = |sel: &Option<DeviceSelector>| -> Result<Option<AntennaLj>> {
            sel.as_ref()
                .map(|s| AntennaLj::new(StarburstLj::connect(connector, s.clone())?))
                .transpose()
        };
        let a = open_antenna(&devices.a)?;
        let b = open_antenna(&devices.b)?;

        info!(
            "OVRO system connected: LO/noise {}, antennas {}{}",
            devices.lonoise.identifier,
            if a.is_some() { "A" } else { "" },
            if b.is_some() { "B" } else { "" }
        );
        Ok(Self { lonoise, a, b })
    }

    pub fn lonoise_mut(&mut self) -> &mut LoNoiseLj {
        &mut self.lonoise
    }

    pub fn antenna_mut(&mut self, id: AntennaId) -> Option<&mut AntennaLj> {
        match id {
            AntennaId::A => self.a.as_mut(),
            AntennaId::B => self.b.as_mut(),
        }
    }

    /// Configured antennas, in A, B order.
    pub fn antennas(&self) -> Vec<AntennaId> {
        AntennaId::BOTH
            .into_iter()
            .filter(|id| match id {
                AntennaId::A => self.a.is_some(),
                AntennaId::B => self.b.is_some(),
            })
            .collect()
    }

    /// Fails before any write when one of `ids` is not configured.
    fn check_antennas(&self, ids: &[AntennaId]) -> Result<()> {
        let configured = self.antennas();
        match ids.iter().find(|id| !configured.contains(*id)) {
            Some(id) => Err(HardwareError::NoAntenna(*id)),
            None => Ok(()),
        }
    }

    fn antennas_mut(&mut self) -> impl Iterator<Item = &mut AntennaLj> {
        self.a.iter_mut().chain(self.b.iter_mut())
    }

    /// All readings keyed `LONOISE`, `A`, `B`; absent antennas are left
    /// out and encode as defaults.
    pub fn monitor_data(&mut self) -> Result<MonitorRecord> {
        let mut data = MonitorRecord::new();
        data.insert("LONOISE".to_string(), RawValue::from(self.lonoise.monitor()?));
        for id in AntennaId::BOTH {
            if let Some(antenna) = self.antenna_mut(id) {
                let record = antenna.monitor()?;
                data.insert(id.key().to_string(), RawValue::from(record));
            }
        }
        Ok(data)
    }

    /// Noise source on, every polarization of every antenna switched to it.
    pub fn select_noise_source(&mut self) -> Result<()> {
        self.lonoise.set_noise_source(true)?;
        for antenna in self.antennas_mut() {
            antenna.select_noise_source(&Polarization::BOTH)?;
        }
        Ok(())
    }

    pub fn select_rf_source(&mut self) -> Result<()> {
        self.lonoise.set_noise_source(false)?;
        for antenna in self.antennas_mut() {
            antenna.select_rf_source(&Polarization::BOTH)?;
        }
        Ok(())
    }

    /// Apply a preset's LO band, and its attenuations to `antennas`.
    pub fn set_to_band(&mut self, preset: &BandPreset, antennas: &[AntennaId]) -> Result<()> {
        self.check_antennas(antennas)?;
        self.lonoise.set_lo_frequency(preset.lo_frequency)?;
        for id in antennas {
            if let Some(antenna) = self.antenna_mut(*id) {
                for (component, level) in &preset.attenuation {
                    antenna.set_attenuator(*level, &[*component])?;
                }
            }
        }
        Ok(())
    }

    pub fn apply_band(&mut self, bands: &BandTable, band: u32, antennas: &[AntennaId]) -> Result<()> {
        let preset = bands.get(&band).ok_or(HardwareError::InvalidBand(band))?;
        self.set_to_band(preset, antennas)?;
        info!("Switched to band {} ({})", band, preset.description);
        Ok(())
    }

    pub fn alter_by_delta(&mut self, delta: f64, antennas: &[AntennaId]) -> Result<()> {
        self.check_antennas(antennas)?;
        for id in antennas {
            if let Some(antenna) = self.antenna_mut(*id) {
                antenna.delta_attenuator(delta, &Component::ALL)?;
            }
        }
        Ok(())
    }

    pub fn end_connection(&mut self) {
        self.lonoise.disconnect();
        for antenna in self.antennas_mut() {
            antenna.disconnect();
        }
    }
}
