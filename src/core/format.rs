// Data structures for locating fields inside a stateframe buffer

use crate::core::codec::parse_token;
use crate::core::error::{Result, StateframeError};
use serde::Serialize;

/// Where and how to read one leaf field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffsetEntry {
    /// Pack token, e.g. `f`, `49s`, `48d`.
    pub format: String,
    pub offset: usize,
    /// Dimensions in schema (`<Dimsize>`) order, for numeric arrays only.
    pub shape: Option<Vec<usize>>,
}

impl OffsetEntry {
    pub fn new(format: String, offset: usize) -> Self {
        Self {
            format,
            offset,
            shape: None,
        }
    }

    pub fn with_shape(format: String, offset: usize, shape: Vec<usize>) -> Self {
        Self {
            format,
            offset,
            shape: Some(shape),
        }
    }

    pub fn byte_len(&self) -> Result<usize> {
        let (count, code) = parse_token(&self.format)?;
        count
            .checked_mul(code.width())
            .ok_or_else(|| StateframeError::SizeOverflow {
                node: self.format.clone(),
            })
    }

    /// Byte range of the field, checked against overflow.
    pub fn span(&self) -> Result<std::ops::Range<usize>> {
        let len = self.byte_len()?;
        let end = self
            .offset
            .checked_add(len)
            .ok_or_else(|| StateframeError::SizeOverflow {
                node: self.format.clone(),
            })?;
        Ok(self.offset..end)
    }
}

/// Every leaf of a schema, in buffer order, keyed by its `/`-joined name
/// path below the root cluster.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    pub(crate) entries: Vec<(String, OffsetEntry)>,
    pub(crate) version: f64,
    pub(crate) size: usize,
}

impl OffsetTable {
    pub fn entries(&self) -> &[(String, OffsetEntry)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stateframe version announced by the schema.
    pub fn version(&self) -> f64 {
        self.version
    }

    /// Total buffer size the schema describes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Result<&OffsetEntry> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| entry)
            .ok_or_else(|| StateframeError::FieldNotFound(name.to_string()))
    }
}
