// Stateframe assembler: monitor data -> fixed-size little-endian buffer

use crate::core::constants::*;
use crate::core::layout::{Node, OVRO_FRAME, STARBURST_FRAME};
use crate::core::value::MonitorRecord;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Which stateframe layout to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// `Data`: the three module clusters only.
    Ovro,
    /// `Dat2`: schedule header, geometry arrays and the Starburst cluster.
    Starburst,
}

impl Frame {
    pub fn layout(self) -> &'static Node {
        match self {
            Frame::Ovro => &OVRO_FRAME,
            Frame::Starburst => &STARBURST_FRAME,
        }
    }

    pub fn default_schema_path(self) -> &'static str {
        match self {
            Frame::Ovro => OVRO_SCHEMA_PATH,
            Frame::Starburst => STARBURST_SCHEMA_PATH,
        }
    }

    /// Buffer size of every frame of this layout.
    pub fn size(self) -> usize {
        self.layout().size()
    }
}

#[derive(Debug, Clone)]
pub struct Assembled {
    /// Pack format of the whole buffer, `<` prefixed.
    pub format: String,
    pub buffer: Vec<u8>,
    pub schema_path: PathBuf,
    /// Schema document, when one was emitted.
    pub schema: Option<String>,
    /// Set when the schema could not be written to disk. The buffer is
    /// valid regardless.
    pub write_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Assembler {
    frame: Frame,
    schema_path: PathBuf,
    archive_dir: Option<PathBuf>,
}

impl Assembler {
    pub fn new(frame: Frame) -> Self {
        let archive_dir = match frame {
            Frame::Starburst => Some(PathBuf::from(STARBURST_ARCHIVE_DIR)),
            Frame::Ovro => None,
        };
        Self {
            frame,
            schema_path: PathBuf::from(frame.default_schema_path()),
            archive_dir,
        }
    }

    pub fn with_schema_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.schema_path = path.into();
        self
    }

    /// Directory for versioned schema copies; `None` disables archiving.
    pub fn with_archive_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.archive_dir = dir;
        self
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    /// Encode `record` into the frame layout. Never fails on bad data:
    /// missing or malformed values encode as their defaults, so the buffer
    /// always has the full frame size.
    pub fn assemble(&self, record: &MonitorRecord, emit_schema: bool) -> Assembled {
        let fragment = self.frame.layout().encode(record, emit_schema);
        debug!(
            "Assembled {:?} frame: {} bytes, {} input keys",
            self.frame,
            fragment.bytes.len(),
            record.len()
        );

        let mut out = Assembled {
            format: format!("{}{}", FORMAT_PREFIX, fragment.format),
            buffer: fragment.bytes,
            schema_path: self.schema_path.clone(),
            schema: None,
            write_error: None,
        };

        if let Some(node) = fragment.schema {
            let xml = node.to_xml();
            match self.write_schema(&xml) {
                Ok(()) => info!(
                    "Schema written to {}; stateframe is {} bytes",
                    self.schema_path.display(),
                    out.buffer.len()
                ),
                Err(e) => {
                    error!(
                        "Failed to write schema {}: {}",
                        self.schema_path.display(),
                        e
                    );
                    out.write_error = Some(e.to_string());
                }
            }
            out.schema = Some(xml);
        }

        out
    }

    fn write_schema(&self, xml: &str) -> io::Result<()> {
        write_file(&self.schema_path, xml)?;

        if let Some(dir) = &self.archive_dir {
            let stem = self
                .schema_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("stateframe");
            let name = format!("{}_v{}_{}.xml", stem, STATEFRAME_VERSION, VERSION_DATE);
            write_file(&dir.join(name), xml)?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, contents)
}

/// Current time as LabVIEW seconds (since 1904-01-01 UTC), the unit of the
/// `Timestamp` field.
pub fn labview_now() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 * 1e-6 + LABVIEW_EPOCH_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::RawValue;

    #[test]
    fn test_empty_input_full_size() {
        for frame in [Frame::Ovro, Frame::Starburst] {
            let out = Assembler::new(frame).assemble(&MonitorRecord::new(), false);
            assert_eq!(out.buffer.len(), frame.size());
            assert!(out.schema.is_none());
            assert!(out.format.starts_with('<'));
        }
        assert_eq!(Frame::Ovro.size(), 419);
        assert_eq!(Frame::Starburst.size(), 1103);
    }

    #[test]
    fn test_schema_written_and_archived() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("tmp").join("schedule2_stateframe.xml");
        let archive = dir.path().join("starburst");

        let out = Assembler::new(Frame::Starburst)
            .with_schema_path(&schema_path)
            .with_archive_dir(Some(archive.clone()))
            .assemble(&MonitorRecord::new(), true);

        assert!(out.write_error.is_none());
        let written = fs::read_to_string(&schema_path).unwrap();
        assert_eq!(Some(written.clone()), out.schema);
        assert!(written.starts_with("<Cluster>\n<Name>Dat2</Name>\n<NumElts>7</NumElts>\n"));

        let backup = archive.join("schedule2_stateframe_v3_3.31.15.xml");
        assert_eq!(fs::read_to_string(backup).unwrap(), written);
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let out = Assembler::new(Frame::Ovro)
            .with_schema_path(blocker.join("ovro.xml"))
            .assemble(&MonitorRecord::new(), true);

        assert!(out.write_error.is_some());
        assert!(out.schema.is_some());
        assert_eq!(out.buffer.len(), 419);
    }

    #[test]
    fn test_starburst_units_nested_under_key() {
        let mut lonoise = MonitorRecord::new();
        lonoise.insert("SERIAL".into(), RawValue::from(470012345));
        let mut starburst = MonitorRecord::new();
        starburst.insert("LONOISE".into(), RawValue::from(lonoise));
        let mut rec = MonitorRecord::new();
        rec.insert("starburst".into(), RawValue::from(starburst));

        let out = Assembler::new(Frame::Starburst).assemble(&rec, false);
        // Timestamp 8, Version 8, ScanState 4, PhaseTracking 4,
        // UVW 8 + 384, Delay 8 + 256, then LONM name 4 + 49
        let serial_at = 8 + 8 + 4 + 4 + 392 + 264 + 53;
        assert_eq!(
            &out.buffer[serial_at..serial_at + 4],
            &470012345u32.to_le_bytes()
        );
    }

    #[test]
    fn test_labview_now_after_2020() {
        // 2020-01-01 in LabVIEW seconds
        assert!(labview_now() > 1_577_836_800.0 + LABVIEW_EPOCH_OFFSET);
    }
}
