// Schema emitter: XML description of a stateframe layout
//
// Grammar:
//   Cluster(Name, NumElts, children*)
//   Array(Name, Dimsize+, element)
//   Leaf(tag in {U8, B8, U16, U32, I16, I32, SGL, DBL}, Name, Val)

use crate::core::codec::TypeCode;
use crate::core::constants::MAX_DIMS;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Cluster {
        name: String,
        children: Vec<SchemaNode>,
    },
    Array {
        name: String,
        dims: Vec<u32>,
        element: Box<SchemaNode>,
    },
    Leaf {
        code: TypeCode,
        name: String,
        value: Option<String>,
    },
}

pub fn emit_leaf(name: &str, code: TypeCode) -> SchemaNode {
    SchemaNode::Leaf {
        code,
        name: name.to_string(),
        value: None,
    }
}

/// Leaf whose `<Val>` carries a constant, e.g. a layout version.
pub fn emit_constant(name: &str, code: TypeCode, value: impl ToString) -> SchemaNode {
    SchemaNode::Leaf {
        code,
        name: name.to_string(),
        value: Some(value.to_string()),
    }
}

/// Array node. Trailing unit dimensions are dropped (at least one is
/// kept), so every `<Dimsize>` matches one dimension word in the buffer.
pub fn emit_array(name: &str, dims: &[u32], element: SchemaNode) -> SchemaNode {
    SchemaNode::Array {
        name: name.to_string(),
        dims: normalize_dims(dims),
        element: Box::new(element),
    }
}

pub fn emit_cluster(name: &str, children: Vec<SchemaNode>) -> SchemaNode {
    SchemaNode::Cluster {
        name: name.to_string(),
        children,
    }
}

pub fn normalize_dims(dims: &[u32]) -> Vec<u32> {
    debug_assert!(dims.len() <= MAX_DIMS, "at most {} dimensions", MAX_DIMS);
    let mut out = dims.to_vec();
    while out.len() > 1 && out.last() == Some(&1) {
        out.pop();
    }
    if out.is_empty() {
        out.push(1);
    }
    out
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Cluster { name, .. }
            | SchemaNode::Array { name, .. }
            | SchemaNode::Leaf { name, .. } => name,
        }
    }

    /// Direct child count of a cluster; zero for anything else.
    pub fn num_elts(&self) -> usize {
        match self {
            SchemaNode::Cluster { children, .. } => children.len(),
            _ => 0,
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            SchemaNode::Cluster { name, children } => {
                out.push_str("<Cluster>\n");
                let _ = writeln!(out, "<Name>{}</Name>", escape(name));
                let _ = writeln!(out, "<NumElts>{}</NumElts>", children.len());
                for child in children {
                    child.write_xml(out);
                }
                out.push_str("</Cluster>\n");
            }
            SchemaNode::Array {
                name,
                dims,
                element,
            } => {
                out.push_str("<Array>\n");
                let _ = writeln!(out, "<Name>{}</Name>", escape(name));
                for d in dims {
                    let _ = writeln!(out, "<Dimsize>{}</Dimsize>", d);
                }
                element.write_xml(out);
                out.push_str("</Array>\n");
            }
            SchemaNode::Leaf { code, name, value } => {
                let tag = code.tag();
                let _ = writeln!(out, "<{}>", tag);
                let _ = writeln!(out, "<Name>{}</Name>", escape(name));
                let _ = writeln!(
                    out,
                    "<Val>{}</Val>",
                    value.as_deref().map(escape).unwrap_or_default()
                );
                let _ = writeln!(out, "</{}>", tag);
            }
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
