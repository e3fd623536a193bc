// Cluster composer: bytes, format tokens and schema built in one pass

use crate::core::codec::{encode_dims, encode_scalar, Encoded, FieldKind, TypeCode};
use crate::core::schema::{
    emit_array, emit_cluster, emit_constant, emit_leaf, normalize_dims, SchemaNode,
};
use crate::core::value::RawValue;

/// A contiguous run of the stateframe together with its format tokens
/// and, when requested, the matching schema node. Bytes and schema come
/// from the same constructor, so they cannot disagree on field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub format: String,
    pub bytes: Vec<u8>,
    pub schema: Option<SchemaNode>,
}

impl Fragment {
    fn push(&mut self, enc: Encoded) {
        self.format.push_str(&enc.token);
        self.bytes.extend(enc.bytes);
    }

    /// Scalar field, or a fixed string (written as a U8 array with its
    /// dimension word, the way readers expect character data).
    pub fn field(name: &str, kind: FieldKind, raw: &RawValue, emit_schema: bool) -> Fragment {
        let mut frag = Fragment::default();
        match kind {
            FieldKind::FixedString(n) => {
                frag.push(encode_dims(&[n as u32]));
                frag.push(encode_scalar(kind, raw));
                if emit_schema {
                    frag.schema = Some(emit_array(
                        name,
                        &[n as u32],
                        emit_leaf("", TypeCode::U8),
                    ));
                }
            }
            FieldKind::Scalar(code) => {
                frag.push(encode_scalar(kind, raw));
                if emit_schema {
                    frag.schema = Some(emit_leaf(name, code));
                }
            }
        }
        frag
    }

    /// Scalar whose value is fixed by the layout and echoed in `<Val>`.
    pub fn constant(name: &str, code: TypeCode, value: f64, emit_schema: bool) -> Fragment {
        let mut frag = Fragment::default();
        frag.push(encode_scalar(FieldKind::Scalar(code), &RawValue::Float(value)));
        if emit_schema {
            frag.schema = Some(match code {
                TypeCode::Sgl | TypeCode::Dbl => emit_constant(name, code, value),
                _ => emit_constant(name, code, value as i64),
            });
        }
        frag
    }

    /// Numeric (or character) array. `data` is nested in the reversed
    /// dimension order; missing elements encode as zero, extra ones are
    /// ignored.
    pub fn array(
        name: &str,
        dims: &[u32],
        code: TypeCode,
        data: &RawValue,
        emit_schema: bool,
    ) -> Fragment {
        let dims = normalize_dims(dims);
        let count: usize = dims.iter().map(|d| *d as usize).product();

        let mut frag = Fragment::default();
        frag.push(encode_dims(&dims));

        if code == TypeCode::U8 {
            frag.push(encode_scalar(FieldKind::FixedString(count), data));
        } else {
            let shape: Vec<usize> = dims.iter().rev().map(|d| *d as usize).collect();
            let mut flat = Vec::with_capacity(count);
            flatten(Some(data), &shape, &mut flat);

            frag.format.push_str(&format!("{}{}", count, code.format_char()));
            for item in flat {
                let enc = encode_scalar(FieldKind::Scalar(code), item.unwrap_or(&RawValue::Null));
                frag.bytes.extend(enc.bytes);
            }
        }

        if emit_schema {
            frag.schema = Some(emit_array(name, &dims, emit_leaf("", code)));
        }
        frag
    }

    /// Array whose elements are clusters. `template` supplies the element
    /// schema when there are no elements to take it from.
    pub fn cluster_array(
        name: &str,
        dims: &[u32],
        elements: Vec<Fragment>,
        template: Option<SchemaNode>,
        emit_schema: bool,
    ) -> Fragment {
        let dims = normalize_dims(dims);
        let mut frag = Fragment::default();
        frag.push(encode_dims(&dims));

        let mut element_schema = template;
        for el in elements {
            frag.format.push_str(&el.format);
            frag.bytes.extend(el.bytes);
            if element_schema.is_none() {
                element_schema = el.schema;
            }
        }

        if emit_schema {
            if let Some(element) = element_schema {
                frag.schema = Some(emit_array(name, &dims, element));
            }
        }
        frag
    }
}

/// Concatenate `children` in order into one cluster. `NumElts` is the
/// direct child count.
pub fn compose(name: &str, children: Vec<Fragment>, emit_schema: bool) -> Fragment {
    let mut frag = Fragment::default();
    let mut nodes = Vec::with_capacity(children.len());

    for child in children {
        frag.format.push_str(&child.format);
        frag.bytes.extend(child.bytes);
        if let Some(node) = child.schema {
            nodes.push(node);
        }
    }

    if emit_schema {
        frag.schema = Some(emit_cluster(name, nodes));
    }
    frag
}

/// Row-major walk over `shape`, yielding `None` where `raw` runs short.
fn flatten<'a>(raw: Option<&'a RawValue>, shape: &[usize], out: &mut Vec<Option<&'a RawValue>>) {
    match shape.split_first() {
        None => out.push(raw),
        Some((&n, rest)) => {
            let items = raw.and_then(RawValue::as_list).unwrap_or(&[]);
            for i in 0..n {
                flatten(items.get(i), rest, out);
            }
        }
    }
}
