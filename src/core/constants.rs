// Layout constants for the Starburst stateframe

/// Version of the outer `Dat2` stateframe. Downstream readers compare this
/// against their own expectation, so any reordering or width change of a
/// field must bump it.
pub const STATEFRAME_VERSION: f64 = 3.0;

/// Version of the inner Starburst cluster layout.
pub const STARBURST_VERSION: u32 = 1;

/// Date of the most recent layout change, used to name schema backups.
pub const VERSION_DATE: &str = "3.31.15";

/// Version a reader assumes when the schema carries no version value.
pub const LEGACY_VERSION: f64 = 3.0;

// Field widths
pub const NAME_LEN: u32 = 49; // LabJack device names are at most 49 chars
pub const DIM_WORD_SIZE: usize = 4; // u32 per array dimension
pub const MAX_DIMS: usize = 4;
/// Upper bound on the elements of an array whose element is a cluster.
pub const MAX_CLUSTER_ELEMENTS: usize = 1 << 16;

pub const NUM_ANTENNAS: u32 = 16;

// Attenuator range in dB
pub const ATTEN_MIN_DB: f64 = 0.0;
pub const ATTEN_MAX_DB: f64 = 31.5;
pub const ATTEN_DEFAULT_DB: f64 = 31.5;

// Schema documents
pub const OVRO_SCHEMA_PATH: &str = "tmp/ovro_stateframe.xml";
pub const STARBURST_SCHEMA_PATH: &str = "tmp/schedule2_stateframe.xml";
pub const STARBURST_ARCHIVE_DIR: &str = "starburst";

/// Seconds from the LabVIEW epoch (1904-01-01) to the Unix epoch.
pub const LABVIEW_EPOCH_OFFSET: f64 = 2_082_844_800.0;

// Format descriptor
pub const FORMAT_PREFIX: &str = "<"; // little-endian, no alignment
