// Starburst OVRO stateframe
// Library entry point: encoder, schema emitter, decoder and hardware port

pub mod bands;
pub mod core;
pub mod hardware;

// Re-export main types
pub use crate::core::assembler::{labview_now, Assembled, Assembler, Frame};
pub use crate::core::error::{Result, StateframeError};
pub use crate::core::format::{OffsetEntry, OffsetTable};
pub use crate::core::reader::{decode, parse, parse_file, SchemaReader};
pub use crate::core::value::{MonitorRecord, RawValue, Value};
