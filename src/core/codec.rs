// Field codec: one scalar or fixed-width string <-> little-endian bytes

use crate::core::error::{Result, StateframeError};
use crate::core::value::{RawValue, Value};

/// Element types a schema may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    U8,
    B8,
    U16,
    U32,
    I16,
    I32,
    Sgl,
    Dbl,
}

impl TypeCode {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "U8" => Some(TypeCode::U8),
            "B8" => Some(TypeCode::B8),
            "U16" => Some(TypeCode::U16),
            "U32" => Some(TypeCode::U32),
            "I16" => Some(TypeCode::I16),
            "I32" => Some(TypeCode::I32),
            "SGL" => Some(TypeCode::Sgl),
            "DBL" => Some(TypeCode::Dbl),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            TypeCode::U8 => "U8",
            TypeCode::B8 => "B8",
            TypeCode::U16 => "U16",
            TypeCode::U32 => "U32",
            TypeCode::I16 => "I16",
            TypeCode::I32 => "I32",
            TypeCode::Sgl => "SGL",
            TypeCode::Dbl => "DBL",
        }
    }

    pub fn from_format_char(c: char) -> Option<Self> {
        match c {
            's' => Some(TypeCode::U8),
            'B' => Some(TypeCode::B8),
            'H' => Some(TypeCode::U16),
            'I' => Some(TypeCode::U32),
            'h' => Some(TypeCode::I16),
            'i' => Some(TypeCode::I32),
            'f' => Some(TypeCode::Sgl),
            'd' => Some(TypeCode::Dbl),
            _ => None,
        }
    }

    /// Pack-format character. `U8` is always a character string.
    pub fn format_char(self) -> char {
        match self {
            TypeCode::U8 => 's',
            TypeCode::B8 => 'B',
            TypeCode::U16 => 'H',
            TypeCode::U32 => 'I',
            TypeCode::I16 => 'h',
            TypeCode::I32 => 'i',
            TypeCode::Sgl => 'f',
            TypeCode::Dbl => 'd',
        }
    }

    pub fn width(self) -> usize {
        match self {
            TypeCode::U8 | TypeCode::B8 => 1,
            TypeCode::U16 | TypeCode::I16 => 2,
            TypeCode::U32 | TypeCode::I32 | TypeCode::Sgl => 4,
            TypeCode::Dbl => 8,
        }
    }
}

/// What a single field slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(TypeCode),
    /// Fixed `n`-byte character slot, zero padded.
    FixedString(usize),
}

impl FieldKind {
    pub fn width(self) -> usize {
        match self {
            FieldKind::Scalar(TypeCode::U8) => 1,
            FieldKind::Scalar(code) => code.width(),
            FieldKind::FixedString(n) => n,
        }
    }
}

/// Bytes for one value plus the pack-format token describing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub token: String,
    pub bytes: Vec<u8>,
}

/// Encode `raw` as `kind`. Never fails: a value that cannot be coerced
/// to the target type, or falls outside its range, encodes as zero.
pub fn encode_scalar(kind: FieldKind, raw: &RawValue) -> Encoded {
    let code = match kind {
        FieldKind::FixedString(n) => return encode_fixed_string(n, raw),
        FieldKind::Scalar(TypeCode::U8) => return encode_fixed_string(1, raw),
        FieldKind::Scalar(code) => code,
    };

    let bytes = match code {
        TypeCode::B8 => vec![coerce_int::<u8>(raw)],
        TypeCode::U16 => coerce_int::<u16>(raw).to_le_bytes().to_vec(),
        TypeCode::U32 => coerce_int::<u32>(raw).to_le_bytes().to_vec(),
        TypeCode::I16 => coerce_int::<i16>(raw).to_le_bytes().to_vec(),
        TypeCode::I32 => coerce_int::<i32>(raw).to_le_bytes().to_vec(),
        TypeCode::Sgl => coerce_f32(raw).to_le_bytes().to_vec(),
        TypeCode::Dbl => raw.as_f64().unwrap_or(0.0).to_le_bytes().to_vec(),
        TypeCode::U8 => unreachable!("U8 handled as a string"),
    };

    Encoded {
        token: code.format_char().to_string(),
        bytes,
    }
}

/// Text is cut to `n` bytes or padded with trailing zeros. Non-text
/// values encode as an empty (all zero) slot.
pub fn encode_fixed_string(n: usize, raw: &RawValue) -> Encoded {
    let text = raw.as_text().unwrap_or("");
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(n, 0);

    Encoded {
        token: format!("{}s", n),
        bytes,
    }
}

/// One u32 word per array dimension, in declaration order.
pub fn encode_dims(dims: &[u32]) -> Encoded {
    let mut bytes = Vec::with_capacity(dims.len() * 4);
    for d in dims {
        bytes.extend_from_slice(&d.to_le_bytes());
    }
    Encoded {
        token: "I".repeat(dims.len()),
        bytes,
    }
}

fn coerce_int<T: TryFrom<i64> + Default>(raw: &RawValue) -> T {
    raw.as_i64()
        .and_then(|v| T::try_from(v).ok())
        .unwrap_or_default()
}

fn coerce_f32(raw: &RawValue) -> f32 {
    match raw.as_f64() {
        Some(v) if v.is_finite() && v.abs() > f32::MAX as f64 => 0.0,
        Some(v) => v as f32,
        None => 0.0,
    }
}

/// Split a pack token like `49s`, `48d` or `f` into (count, type).
pub fn parse_token(token: &str) -> Result<(usize, TypeCode)> {
    let c = token
        .chars()
        .last()
        .ok_or_else(|| StateframeError::InvalidFormat(token.to_string()))?;
    let code = TypeCode::from_format_char(c)
        .ok_or_else(|| StateframeError::InvalidFormat(token.to_string()))?;

    let digits = &token[..token.len() - c.len_utf8()];
    let count = if digits.is_empty() {
        1
    } else {
        digits
            .parse::<usize>()
            .map_err(|_| StateframeError::InvalidFormat(token.to_string()))?
    };

    Ok((count, code))
}

/// Decode one element of `code` from exactly `code.width()` bytes.
pub fn decode_scalar(code: TypeCode, bytes: &[u8]) -> Value {
    match code {
        TypeCode::U8 => Value::Text(decode_string(bytes)),
        TypeCode::B8 => Value::B8(bytes[0]),
        TypeCode::U16 => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
        TypeCode::I16 => Value::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
        TypeCode::U32 => Value::U32(u32::from_le_bytes(word(bytes))),
        TypeCode::I32 => Value::I32(i32::from_le_bytes(word(bytes))),
        TypeCode::Sgl => Value::F32(f32::from_le_bytes(word(bytes))),
        TypeCode::Dbl => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            Value::F64(f64::from_le_bytes(b))
        }
    }
}

/// Fixed-width string with its zero padding stripped.
pub fn decode_string(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn word(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}
