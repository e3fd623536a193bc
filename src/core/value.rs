// Monitor values: loosely typed encoder input and typed decoder output

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit's readings (or the whole monitor dictionary), keyed by short
/// field code such as `POW_24V` or `LOFREQ`.
pub type MonitorRecord = BTreeMap<String, RawValue>;

/// A raw value as delivered by the hardware layer or a fixture.
///
/// The encoder coerces these into the declared field type and falls back
/// to the type's zero when the coercion fails, so nothing here is assumed
/// to be well formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<RawValue>),
    Record(MonitorRecord),
}

impl RawValue {
    pub fn record<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawValue>,
    {
        RawValue::Record(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Float coercion. Numeric text parses; anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Float(v) => Some(*v),
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RawValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Integer coercion. Floats truncate toward zero, text must hold an
    /// integer literal.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Int(v) => Some(*v),
            RawValue::Bool(b) => Some(*b as i64),
            RawValue::Float(v) if v.is_finite() => {
                let t = v.trunc();
                if t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                    Some(t as i64)
                } else {
                    None
                }
            }
            RawValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            RawValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&MonitorRecord> {
        match self {
            RawValue::Record(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v as i64)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<u32> for RawValue {
    fn from(v: u32) -> Self {
        RawValue::Int(v as i64)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// `(label, code)` pairs such as the LO frequency reading.
impl From<(&str, i64)> for RawValue {
    fn from((label, code): (&str, i64)) -> Self {
        RawValue::List(vec![RawValue::from(label), RawValue::Int(code)])
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(v: Vec<T>) -> Self {
        RawValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<MonitorRecord> for RawValue {
    fn from(v: MonitorRecord) -> Self {
        RawValue::Record(v)
    }
}

/// A value read back out of a stateframe buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    B8(u8),
    U16(u16),
    U32(u32),
    I16(i16),
    I32(i32),
    F32(f32),
    F64(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::B8(v) => Some(*v as f64),
            Value::U16(v) => Some(*v as f64),
            Value::U32(v) => Some(*v as f64),
            Value::I16(v) => Some(*v as f64),
            Value::I32(v) => Some(*v as f64),
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Walk nested lists, e.g. `uvw.index(&[antenna, 2])`.
    pub fn index(&self, path: &[usize]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |node, &i| node.as_list().and_then(|l| l.get(i)))
    }

    /// Lengths of the nested lists along the first element of each level.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut node = self;
        while let Value::List(items) = node {
            shape.push(items.len());
            match items.first() {
                Some(first) => node = first,
                None => break,
            }
        }
        shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(RawValue::from("24.5").as_f64(), Some(24.5));
        assert_eq!(RawValue::from("n/a").as_f64(), None);
        assert_eq!(RawValue::from(3.9).as_i64(), Some(3));
        assert_eq!(RawValue::from(-3.9).as_i64(), Some(-3));
        assert_eq!(RawValue::from("3.5").as_i64(), None);
        assert_eq!(RawValue::Float(f64::NAN).as_i64(), None);
        assert_eq!(RawValue::from(true).as_i64(), Some(1));
        assert_eq!(RawValue::Null.as_f64(), None);
    }

    #[test]
    fn test_deserialize_monitor_json() {
        let json = r#"{"NAME": "AntennaA", "SERIAL": 2000, "POW_24V": 24.1,
                       "LOFREQ": ["LO_7_5GHZ", 1], "MISSING": null}"#;
        let record: MonitorRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record["NAME"], RawValue::from("AntennaA"));
        assert_eq!(record["SERIAL"], RawValue::Int(2000));
        assert_eq!(record["POW_24V"], RawValue::Float(24.1));
        assert_eq!(record["LOFREQ"], RawValue::from(("LO_7_5GHZ", 1)));
        assert_eq!(record["MISSING"], RawValue::Null);
    }

    #[test]
    fn test_value_index_and_shape() {
        let v = Value::List(vec![
            Value::List(vec![Value::F64(1.0), Value::F64(2.0), Value::F64(3.0)]),
            Value::List(vec![Value::F64(4.0), Value::F64(5.0), Value::F64(6.0)]),
        ]);
        assert_eq!(v.shape(), vec![2, 3]);
        assert_eq!(v.index(&[1, 2]), Some(&Value::F64(6.0)));
        assert_eq!(v.index(&[2, 0]), None);
    }
}
