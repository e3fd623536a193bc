// Band presets: an LO band plus per-path attenuation, persisted as JSON

use crate::core::constants::{ATTEN_MAX_DB, ATTEN_MIN_DB};
use crate::hardware::{Component, LoFrequency};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, BandError>;

#[derive(Error, Debug)]
pub enum BandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed band file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Band {0} does not exist")]
    NotFound(u32),

    #[error("Band {band} has no attenuation for {component:?}")]
    MissingComponent { band: u32, component: Component },

    #[error("Band {band}: attenuation {value} dB for {component:?} is outside 0..=31.5")]
    InvalidAttenuation {
        band: u32,
        component: Component,
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPreset {
    #[serde(rename = "DESCR")]
    pub description: String,
    #[serde(rename = "LOFREQ")]
    pub lo_frequency: LoFrequency,
    #[serde(rename = "ATTEN")]
    pub attenuation: BTreeMap<Component, f64>,
}

impl BandPreset {
    pub fn new(description: &str, lo_frequency: LoFrequency, atten: [f64; 4]) -> Self {
        Self {
            description: description.to_string(),
            lo_frequency,
            attenuation: Component::ALL.into_iter().zip(atten).collect(),
        }
    }

    fn validate(&self, band: u32) -> Result<()> {
        for component in Component::ALL {
            let value = *self
                .attenuation
                .get(&component)
                .ok_or(BandError::MissingComponent { band, component })?;
            if !(ATTEN_MIN_DB..=ATTEN_MAX_DB).contains(&value) {
                return Err(BandError::InvalidAttenuation {
                    band,
                    component,
                    value,
                });
            }
        }
        Ok(())
    }
}

pub type BandTable = BTreeMap<u32, BandPreset>;

/// Table used when no band file exists yet.
pub fn default_bands() -> BandTable {
    BandTable::from([(
        1,
        BandPreset::new("Default band", LoFrequency::Lo3_4GHz, [10.0, 10.0, 12.0, 12.0]),
    )])
}

#[derive(Debug, Clone)]
pub struct BandStore {
    path: PathBuf,
}

impl BandStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table; a missing file is created with the default table.
    pub fn load(&self) -> Result<BandTable> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No band file at {}, writing defaults",
                    self.path.display()
                );
                let bands = default_bands();
                self.save(&bands)?;
                Ok(bands)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, bands: &BandTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(bands)?)?;
        info!("Saved {} band(s) to {}", bands.len(), self.path.display());
        Ok(())
    }

    /// Add or replace `band`. Returns the updated table.
    pub fn upsert(&self, band: u32, preset: BandPreset) -> Result<BandTable> {
        preset.validate(band)?;
        let mut bands = self.load()?;
        bands.insert(band, preset);
        self.save(&bands)?;
        Ok(bands)
    }

    pub fn remove(&self, band: u32) -> Result<BandPreset> {
        let mut bands = self.load()?;
        let removed = bands.remove(&band).ok_or(BandError::NotFound(band))?;
        self.save(&bands)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = BandStore::new(dir.path().join("bands.json"));

        let bands = store.load().unwrap();
        assert_eq!(bands, default_bands());
        assert!(store.path().exists());

        let band = &bands[&1];
        assert_eq!(band.lo_frequency, LoFrequency::Lo3_4GHz);
        assert_eq!(band.attenuation[&Component::Hq], 12.0);
    }

    #[test]
    fn test_json_layout() {
        let json = serde_json::to_value(default_bands()).unwrap();
        assert_eq!(json["1"]["LOFREQ"], 0);
        assert_eq!(json["1"]["ATTEN"]["VQ"], 10.0);
        assert_eq!(json["1"]["DESCR"], "Default band");
    }

    #[test]
    fn test_upsert_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = BandStore::new(dir.path().join("bands.json"));

        let preset = BandPreset::new("X band", LoFrequency::Lo7_5GHz, [5.0, 5.5, 6.0, 6.5]);
        let bands = store.upsert(4, preset.clone()).unwrap();
        assert_eq!(bands.len(), 2);
        assert_eq!(store.load().unwrap()[&4], preset);

        assert_eq!(store.remove(4).unwrap(), preset);
        assert!(matches!(store.remove(4), Err(BandError::NotFound(4))));
    }

    #[test]
    fn test_upsert_rejects_bad_attenuation() {
        let dir = tempfile::tempdir().unwrap();
        let store = BandStore::new(dir.path().join("bands.json"));

        let preset = BandPreset::new("bad", LoFrequency::Lo3_4GHz, [5.0, 40.0, 6.0, 6.5]);
        assert!(matches!(
            store.upsert(2, preset),
            Err(BandError::InvalidAttenuation { band: 2, component: Component::Vi, .. })
        ));

        let mut partial = BandPreset::new("partial", LoFrequency::Lo3_4GHz, [1.0; 4]);
        partial.attenuation.remove(&Component::Hi);
        assert!(matches!(
            store.upsert(3, partial),
            Err(BandError::MissingComponent { component: Component::Hi, .. })
        ));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(BandStore::new(path).load(), Err(BandError::Json(_))));
    }
}
