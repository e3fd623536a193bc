// Declarative stateframe layouts
//
// Every module type is an ordered table of field descriptors. The same
// table drives the bytes, the format string and the schema, and its order
// (never the input dictionary's) fixes the binary layout.

use crate::core::codec::{FieldKind, TypeCode};
use crate::core::composer::{compose, Fragment};
use crate::core::constants::*;
use crate::core::schema::normalize_dims;
use crate::core::value::{MonitorRecord, RawValue};
use std::collections::BTreeMap;

static EMPTY: MonitorRecord = BTreeMap::new();

/// How a field's stored value is derived from the raw reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extract {
    Direct,
    /// Second element of a `(label, code)` pair.
    PairCode,
    Clamp { min: f64, max: f64 },
}

/// Value used when the key is absent from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Zero,
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
    pub extract: Extract,
}

impl FieldSpec {
    pub const fn scalar(key: &'static str, name: &'static str, code: TypeCode) -> Self {
        Self {
            key,
            name,
            kind: FieldKind::Scalar(code),
            default: FieldDefault::Zero,
            extract: Extract::Direct,
        }
    }

    pub const fn text(key: &'static str, name: &'static str, len: u32) -> Self {
        Self {
            key,
            name,
            kind: FieldKind::FixedString(len as usize),
            default: FieldDefault::Zero,
            extract: Extract::Direct,
        }
    }

    pub const fn with_default(self, default: f64) -> Self {
        Self {
            default: FieldDefault::Float(default),
            ..self
        }
    }

    pub const fn pair_code(self) -> Self {
        Self {
            extract: Extract::PairCode,
            ..self
        }
    }

    pub const fn clamped(self, min: f64, max: f64) -> Self {
        Self {
            extract: Extract::Clamp { min, max },
            ..self
        }
    }

    /// The value to encode for this field out of `record`.
    pub fn resolve(&self, record: &MonitorRecord) -> RawValue {
        let raw = match record.get(self.key) {
            Some(v) => v.clone(),
            None => match (self.default, self.kind) {
                (FieldDefault::Float(v), _) => RawValue::Float(v),
                (FieldDefault::Zero, FieldKind::FixedString(_)) => RawValue::Text(String::new()),
                (FieldDefault::Zero, _) => RawValue::Int(0),
            },
        };

        match self.extract {
            Extract::Direct => raw,
            Extract::PairCode => match raw {
                RawValue::List(items) => items.get(1).cloned().unwrap_or(RawValue::Null),
                other => other,
            },
            Extract::Clamp { min, max } => {
                RawValue::Float(raw.as_f64().unwrap_or(0.0).clamp(min, max))
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Node {
    Field(FieldSpec),
    /// Value fixed by the layout itself, e.g. a version number.
    Constant {
        name: &'static str,
        code: TypeCode,
        value: f64,
    },
    /// Numeric array. With several keys, each key supplies one slice
    /// along the outermost decoded axis.
    Array {
        name: &'static str,
        keys: &'static [&'static str],
        dims: &'static [u32],
        code: TypeCode,
    },
    /// Array of structured records read from a list under `key`.
    ClusterArray {
        name: &'static str,
        key: &'static str,
        dims: &'static [u32],
        element: &'static Node,
    },
    /// Named group. With a key, children read the nested record under
    /// that key (an empty record when it is missing).
    Cluster {
        name: &'static str,
        key: Option<&'static str>,
        groups: &'static [&'static [Node]],
    },
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Field(spec) => spec.name,
            Node::Constant { name, .. }
            | Node::Array { name, .. }
            | Node::ClusterArray { name, .. }
            | Node::Cluster { name, .. } => *name,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Node> {
        let groups: &'static [&'static [Node]] = match self {
            Node::Cluster { groups, .. } => *groups,
            _ => &[],
        };
        groups.iter().flat_map(|g| g.iter())
    }

    /// Encoded size in bytes. Independent of the data.
    pub fn size(&self) -> usize {
        match self {
            Node::Field(spec) => match spec.kind {
                FieldKind::FixedString(n) => DIM_WORD_SIZE + n,
                kind => kind.width(),
            },
            Node::Constant { code, .. } => code.width(),
            Node::Array { dims, code, .. } => {
                let dims = normalize_dims(dims);
                DIM_WORD_SIZE * dims.len() + element_count(&dims) * code.width()
            }
            Node::ClusterArray { dims, element, .. } => {
                let dims = normalize_dims(dims);
                DIM_WORD_SIZE * dims.len() + element_count(&dims) * element.size()
            }
            Node::Cluster { .. } => self.children().map(Node::size).sum(),
        }
    }

    pub fn encode(&self, record: &MonitorRecord, emit_schema: bool) -> Fragment {
        match self {
            Node::Field(spec) => {
                Fragment::field(spec.name, spec.kind, &spec.resolve(record), emit_schema)
            }
            Node::Constant { name, code, value } => {
                Fragment::constant(name, *code, *value, emit_schema)
            }
            Node::Array {
                name,
                keys,
                dims,
                code,
            } => {
                let data = match *keys {
                    [key] => record.get(*key).cloned().unwrap_or(RawValue::Null),
                    _ => RawValue::List(
                        keys.iter()
                            .map(|k| record.get(*k).cloned().unwrap_or(RawValue::Null))
                            .collect(),
                    ),
                };
                Fragment::array(name, dims, *code, &data, emit_schema)
            }
            Node::ClusterArray {
                name,
                key,
                dims,
                element,
            } => {
                let count = element_count(&normalize_dims(dims));
                let items = record.get(*key).and_then(RawValue::as_list).unwrap_or(&[]);
                let elements: Vec<Fragment> = (0..count)
                    .map(|i| {
                        let rec = items
                            .get(i)
                            .and_then(RawValue::as_record)
                            .unwrap_or(&EMPTY);
                        element.encode(rec, emit_schema)
                    })
                    .collect();
                let template = if emit_schema && count == 0 {
                    element.encode(&EMPTY, true).schema
                } else {
                    None
                };
                Fragment::cluster_array(name, dims, elements, template, emit_schema)
            }
            Node::Cluster { name, key, .. } => {
                let sub = match key {
                    Some(k) => record
                        .get(*k)
                        .and_then(RawValue::as_record)
                        .unwrap_or(&EMPTY),
                    None => record,
                };
                let children = self.children().map(|n| n.encode(sub, emit_schema)).collect();
                compose(name, children, emit_schema)
            }
        }
    }
}

fn element_count(dims: &[u32]) -> usize {
    dims.iter().map(|d| *d as usize).product()
}

// ---------------------------------------------------------------------------
// Module tables
// ---------------------------------------------------------------------------

/// Fields every LabJack module reports.
pub const GENERIC_BLOCK: &[Node] = &[
    Node::Field(FieldSpec::text("NAME", "Name", NAME_LEN)),
    Node::Field(FieldSpec::scalar("SERIAL", "SerialNumber", TypeCode::U32)),
    Node::Field(FieldSpec::scalar("POW_24V", "Voltage.24v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("POW_15V", "Voltage.15v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("POW_12V", "Voltage.12v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("POW_5V", "Voltage.5v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("POW_N5V", "Voltage.Neg5v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("POW_S5V", "Voltage.Switched5v", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("LJTEMP", "Temp.labjack", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("LJAIRTEMP", "Temp.air", TypeCode::Sgl)),
];

/// LO / noise source module: 0 = off, 1 = on; LO band code 0..=3.
pub const LONOISE_BLOCK: &[Node] = &[
    Node::Field(FieldSpec::scalar("NSSTAT", "NoiseSourceStatus", TypeCode::U32)),
    Node::Field(FieldSpec::scalar("LOFREQ", "LOFrequency", TypeCode::U32).pair_code()),
];

const fn attenuation(key: &'static str, name: &'static str) -> Node {
    Node::Field(
        FieldSpec::scalar(key, name, TypeCode::Dbl)
            .with_default(ATTEN_DEFAULT_DB)
            .clamped(ATTEN_MIN_DB, ATTEN_MAX_DB),
    )
}

/// Dual-polarization antenna front end. Power in dBm, temperature in C,
/// source selection 0 = antenna, 1 = noise source.
pub const ANTENNA_BLOCK: &[Node] = &[
    Node::Field(FieldSpec::scalar("VQPOW", "Power.vq", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("VIPOW", "Power.vi", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("HQPOW", "Power.hq", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("HIPOW", "Power.hi", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("VQTEMP", "Temp.vq", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("VITEMP", "Temp.vi", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("HQTEMP", "Temp.hq", TypeCode::Sgl)),
    Node::Field(FieldSpec::scalar("HITEMP", "Temp.hi", TypeCode::Sgl)),
    attenuation("VQATTEN", "Attenuation.vq"),
    attenuation("VIATTEN", "Attenuation.vi"),
    attenuation("HQATTEN", "Attenuation.hq"),
    attenuation("HIATTEN", "Attenuation.hi"),
    Node::Field(FieldSpec::scalar("VNSSEL", "SourceSelection.v", TypeCode::U32)),
    Node::Field(FieldSpec::scalar("HNSSEL", "SourceSelection.h", TypeCode::U32)),
];

const fn lonoise_module(name: &'static str) -> Node {
    Node::Cluster {
        name,
        key: Some("LONOISE"),
        groups: &[GENERIC_BLOCK, LONOISE_BLOCK],
    }
}

const fn antenna_module(name: &'static str, key: &'static str) -> Node {
    Node::Cluster {
        name,
        key: Some(key),
        groups: &[GENERIC_BLOCK, ANTENNA_BLOCK],
    }
}

/// Module-only frame: `Data` holding the three module clusters.
pub static OVRO_FRAME: Node = Node::Cluster {
    name: "Data",
    key: None,
    groups: &[&[
        lonoise_module("LONoiseModule"),
        antenna_module("AntennaAModule", "A"),
        antenna_module("AntennaBModule", "B"),
    ]],
};

/// Full `Dat2` stateframe: schedule header, geometry arrays and the
/// Starburst cluster with its own trailing version.
pub static STARBURST_FRAME: Node = Node::Cluster {
    name: "Dat2",
    key: None,
    groups: &[&[
        Node::Field(FieldSpec::scalar("timestamp", "Timestamp", TypeCode::Dbl)),
        Node::Constant {
            name: "Version",
            code: TypeCode::Dbl,
            value: STATEFRAME_VERSION,
        },
        Node::Field(FieldSpec::scalar("scan_state", "ScanState", TypeCode::I32)),
        Node::Field(FieldSpec::scalar("phase_tracking", "PhaseTracking", TypeCode::U32)),
        Node::Array {
            name: "UVW",
            keys: &["uvw"],
            dims: &[3, NUM_ANTENNAS],
            code: TypeCode::Dbl,
        },
        Node::Array {
            name: "Delay",
            keys: &["delay", "delay1"],
            dims: &[NUM_ANTENNAS, 2],
            code: TypeCode::Dbl,
        },
        Node::Cluster {
            name: "Starburst",
            key: Some("starburst"),
            groups: &[&[
                lonoise_module("LONM"),
                antenna_module("DCMA", "A"),
                antenna_module("DCMB", "B"),
                Node::Constant {
                    name: "Version",
                    code: TypeCode::U32,
                    value: STARBURST_VERSION as f64,
                },
            ]],
        },
    ]],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        let generic: usize = GENERIC_BLOCK.iter().map(Node::size).sum();
        assert_eq!(generic, 4 + 49 + 4 + 8 * 4);
        assert_eq!(lonoise_module("x").size(), 97);
        assert_eq!(antenna_module("x", "A").size(), 161);
        assert_eq!(OVRO_FRAME.size(), 419);
        assert_eq!(STARBURST_FRAME.size(), 1103);
    }

    #[test]
    fn test_num_elts_match_children() {
        assert_eq!(OVRO_FRAME.children().count(), 3);
        assert_eq!(lonoise_module("x").children().count(), 12);
        assert_eq!(antenna_module("x", "A").children().count(), 24);
        assert_eq!(STARBURST_FRAME.children().count(), 7);
    }

    #[test]
    fn test_pair_code_extraction() {
        let spec = FieldSpec::scalar("LOFREQ", "LOFrequency", TypeCode::U32).pair_code();
        let mut rec = MonitorRecord::new();
        assert_eq!(spec.resolve(&rec), RawValue::Int(0));

        rec.insert("LOFREQ".into(), RawValue::from(("LO_11_5GHZ", 2)));
        assert_eq!(spec.resolve(&rec), RawValue::Int(2));

        rec.insert("LOFREQ".into(), RawValue::from(vec!["LO_3_4GHZ"]));
        assert_eq!(spec.resolve(&rec), RawValue::Null);
    }

    #[test]
    fn test_attenuation_default_and_cap() {
        let node = attenuation("VQATTEN", "Attenuation.vq");
        let spec = match node {
            Node::Field(spec) => spec,
            _ => unreachable!(),
        };
        let mut rec = MonitorRecord::new();
        assert_eq!(spec.resolve(&rec), RawValue::Float(31.5));

        rec.insert("VQATTEN".into(), RawValue::from(45.0));
        assert_eq!(spec.resolve(&rec), RawValue::Float(31.5));

        rec.insert("VQATTEN".into(), RawValue::from(-3));
        assert_eq!(spec.resolve(&rec), RawValue::Float(0.0));

        rec.insert("VQATTEN".into(), RawValue::from("broken"));
        assert_eq!(spec.resolve(&rec), RawValue::Float(0.0));
    }

    #[test]
    fn test_cluster_array_encoding() {
        static RECORD: Node = Node::Cluster {
            name: "Rec",
            key: None,
            groups: &[&[
                Node::Field(FieldSpec::scalar("id", "Id", TypeCode::U32)),
                Node::Field(FieldSpec::scalar("t", "Temp", TypeCode::Sgl)),
            ]],
        };
        static TABLE: Node = Node::ClusterArray {
            name: "Records",
            key: "records",
            dims: &[3],
            element: &RECORD,
        };

        let mut rec = MonitorRecord::new();
        rec.insert(
            "records".into(),
            RawValue::List(vec![
                RawValue::record([("id", RawValue::from(1)), ("t", RawValue::from(1.5))]),
                RawValue::record([("id", RawValue::from(2))]),
            ]),
        );

        let frag = TABLE.encode(&rec, true);
        assert_eq!(frag.bytes.len(), TABLE.size());
        assert_eq!(frag.bytes.len(), 4 + 3 * 8);
        assert_eq!(frag.format, "IIfIfIf");
        assert_eq!(&frag.bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&frag.bytes[12..16], &2u32.to_le_bytes());
        assert_eq!(&frag.bytes[20..28], &[0u8; 8]);
    }
}
