// Error handling for the stateframe schema and decoder

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateframeError>;

#[derive(Error, Debug)]
pub enum StateframeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Illegal format for {node}: expected <{expected}>, got {got}")]
    MissingTag {
        node: String,
        expected: &'static str,
        got: String,
    },

    #[error("Unknown element type: <{0}>")]
    UnknownType(String),

    #[error("Invalid <{tag}> value: {value:?}")]
    InvalidNumber { tag: &'static str, value: String },

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Buffer too short: need {needed} bytes at offset {offset}, have {len}")]
    BufferTooShort {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Invalid format token: {0}")]
    InvalidFormat(String),

    #[error("Size of {node} does not fit the address space")]
    SizeOverflow { node: String },

    #[error("Shape {shape:?} does not hold {count} elements")]
    ShapeMismatch { shape: Vec<usize>, count: usize },
}
