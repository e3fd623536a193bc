// Schema reader: XML description -> offset table, and typed field decoding

use crate::core::codec::{decode_scalar, decode_string, parse_token, TypeCode};
use crate::core::constants::*;
use crate::core::error::{Result, StateframeError};
use crate::core::format::*;
use crate::core::value::Value;
use roxmltree::Node as XmlNode;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// A parsed schema document bound to the file it came from.
pub struct SchemaReader {
    path: PathBuf,
    table: OffsetTable,
}

impl SchemaReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = parse_file(&path)?;
        Ok(Self { path, table })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &OffsetTable {
        &self.table
    }

    pub fn version(&self) -> f64 {
        self.table.version()
    }

    pub fn list_fields(&self) -> Vec<&str> {
        self.table.names().collect()
    }

    pub fn read_field(&self, buffer: &[u8], name: &str) -> Result<Value> {
        self.table.extract(buffer, name)
    }

    pub fn read_all(&self, buffer: &[u8]) -> Result<Vec<(String, Value)>> {
        self.table.decode_all(buffer)
    }
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<OffsetTable> {
    let xml = fs::read_to_string(path.as_ref())?;
    parse(&xml)
}

/// Walk a schema document and compute the offset of every leaf. Any
/// deviation from the expected grammar is an error; nothing is skipped.
pub fn parse(xml: &str) -> Result<OffsetTable> {
    let table = parse_document(xml).map_err(|e| {
        error!("Failed to parse stateframe schema: {}", e);
        e
    })?;
    debug!(
        "Parsed schema v{}: {} fields, {} bytes",
        table.version,
        table.entries.len(),
        table.size
    );
    Ok(table)
}

fn parse_document(xml: &str) -> Result<OffsetTable> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "Cluster" {
        return Err(StateframeError::MissingTag {
            node: "document".to_string(),
            expected: "Cluster",
            got: describe(Some(root)),
        });
    }

    let mut entries = Vec::new();
    // Root name is not part of the field paths.
    let size = walk_cluster(root, None, false, 0, &mut entries)?;

    Ok(OffsetTable {
        entries,
        version: read_version(root),
        size,
    })
}

/// Element children of one schema node, consumed in order.
struct Items<'a, 'input> {
    nodes: Vec<XmlNode<'a, 'input>>,
    pos: usize,
    owner: String,
}

impl<'a, 'input> Items<'a, 'input> {
    fn of(node: XmlNode<'a, 'input>, owner: String) -> Self {
        Self {
            nodes: node.children().filter(|n| n.is_element()).collect(),
            pos: 0,
            owner,
        }
    }

    fn peek(&self) -> Option<XmlNode<'a, 'input>> {
        self.nodes.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<XmlNode<'a, 'input>> {
        let node = self.peek();
        if node.is_some() {
            self.pos += 1;
        }
        node
    }

    fn expect(&mut self, tag: &'static str) -> Result<XmlNode<'a, 'input>> {
        match self.peek() {
            Some(node) if node.tag_name().name() == tag => {
                self.pos += 1;
                Ok(node)
            }
            other => Err(StateframeError::MissingTag {
                node: self.owner.clone(),
                expected: tag,
                got: describe(other),
            }),
        }
    }
}

fn describe(node: Option<XmlNode>) -> String {
    match node {
        Some(n) => format!("<{}>", n.tag_name().name()),
        None => "end of element".to_string(),
    }
}

fn text(node: XmlNode) -> String {
    node.text().unwrap_or("").to_string()
}

fn number(node: XmlNode, tag: &'static str) -> Result<usize> {
    let raw = node.text().unwrap_or("").trim();
    raw.parse::<usize>()
        .map_err(|_| StateframeError::InvalidNumber {
            tag,
            value: raw.to_string(),
        })
}

fn join(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{}/{}", p, name),
        None => name.to_string(),
    }
}

/// `keep_name` is false for the root and for array elements, whose
/// children take the path they are given.
fn walk_cluster(
    node: XmlNode,
    prefix: Option<&str>,
    keep_name: bool,
    mut offset: usize,
    out: &mut Vec<(String, OffsetEntry)>,
) -> Result<usize> {
    let owner = prefix.map(str::to_string).unwrap_or_else(|| "Cluster".to_string());
    let mut items = Items::of(node, owner);
    let name = text(items.expect("Name")?);
    let count = number(items.expect("NumElts")?, "NumElts")?;

    let scope = if keep_name {
        Some(join(prefix, &name))
    } else {
        prefix.map(str::to_string)
    };

    for _ in 0..count {
        let child = items.next().ok_or_else(|| StateframeError::MissingTag {
            node: scope.clone().unwrap_or_else(|| name.clone()),
            expected: "element",
            got: describe(None),
        })?;
        offset = walk_item(child, scope.as_deref(), offset, out)?;
    }
    Ok(offset)
}

fn walk_item(
    node: XmlNode,
    prefix: Option<&str>,
    offset: usize,
    out: &mut Vec<(String, OffsetEntry)>,
) -> Result<usize> {
    match node.tag_name().name() {
        "Cluster" => walk_cluster(node, prefix, true, offset, out),
        "Array" => walk_array(node, prefix, offset, out),
        tag => {
            let code = TypeCode::from_tag(tag)
                .ok_or_else(|| StateframeError::UnknownType(tag.to_string()))?;
            let mut items = Items::of(node, join(prefix, tag));
            let name = text(items.expect("Name")?);
            let path = join(prefix, &name);
            let end = advance(offset, code.width(), &path)?;
            out.push((path, OffsetEntry::new(code.format_char().to_string(), offset)));
            Ok(end)
        }
    }
}

fn walk_array(
    node: XmlNode,
    prefix: Option<&str>,
    offset: usize,
    out: &mut Vec<(String, OffsetEntry)>,
) -> Result<usize> {
    let mut items = Items::of(node, join(prefix, "Array"));
    let path = join(prefix, &text(items.expect("Name")?));
    items.owner = path.clone();

    let mut dims = Vec::new();
    while dims.len() < MAX_DIMS {
        match items.peek() {
            Some(n) if n.tag_name().name() == "Dimsize" => {
                dims.push(number(n, "Dimsize")?);
                items.next();
            }
            _ => break,
        }
    }
    if dims.is_empty() {
        items.expect("Dimsize")?;
    }

    let element = items.next().ok_or_else(|| StateframeError::MissingTag {
        node: path.clone(),
        expected: "element",
        got: describe(None),
    })?;

    let count = dims
        .iter()
        .try_fold(1usize, |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| overflow(&path))?;
    let mut offset = advance(offset, DIM_WORD_SIZE * dims.len(), &path)?;

    match element.tag_name().name() {
        "Cluster" => {
            if count > MAX_CLUSTER_ELEMENTS {
                return Err(overflow(&path));
            }
            for i in 0..count {
                let slot = format!("{}[{}]", path, i);
                offset = walk_cluster(element, Some(&slot), false, offset, out)?;
            }
        }
        "Array" => return Err(StateframeError::UnknownType(format!("Array in {}", path))),
        tag => {
            let code = TypeCode::from_tag(tag)
                .ok_or_else(|| StateframeError::UnknownType(tag.to_string()))?;
            let token = format!("{}{}", count, code.format_char());
            let entry = if code == TypeCode::U8 {
                // character data reads back as one string
                OffsetEntry::new(token, offset)
            } else {
                OffsetEntry::with_shape(token, offset, dims)
            };
            let len = count.checked_mul(code.width()).ok_or_else(|| overflow(&path))?;
            offset = advance(offset, len, &path)?;
            out.push((path, entry));
        }
    }
    Ok(offset)
}

fn overflow(node: &str) -> StateframeError {
    StateframeError::SizeOverflow {
        node: node.to_string(),
    }
}

fn advance(offset: usize, len: usize, node: &str) -> Result<usize> {
    offset.checked_add(len).ok_or_else(|| overflow(node))
}

/// Version lives in the `<Val>` of the root's second data child (the
/// fourth element child after Name and NumElts).
fn read_version(root: XmlNode) -> f64 {
    root.children()
        .filter(|n| n.is_element())
        .nth(3)
        .and_then(|n| n.children().find(|c| c.has_tag_name("Val")))
        .and_then(|v| v.text())
        .and_then(|t| t.trim().parse::<f64>().ok())
        .unwrap_or(LEGACY_VERSION)
}

/// Read one field out of `buffer`. Numeric arrays come back nested in
/// reverse `<Dimsize>` order, row-major.
pub fn decode(buffer: &[u8], entry: &OffsetEntry) -> Result<Value> {
    let (count, code) = parse_token(&entry.format)?;
    let span = entry.span()?;
    let needed = span.len();
    let bytes = buffer
        .get(span)
        .ok_or(StateframeError::BufferTooShort {
            offset: entry.offset,
            needed,
            len: buffer.len(),
        })?;

    if code == TypeCode::U8 {
        return Ok(Value::Text(decode_string(bytes)));
    }

    let mut flat: Vec<Value> = bytes
        .chunks_exact(code.width())
        .map(|c| decode_scalar(code, c))
        .collect();

    match &entry.shape {
        Some(dims) => {
            let shape: Vec<usize> = dims.iter().rev().copied().collect();
            reshape(flat, &shape)
        }
        None if count == 1 => flat
            .pop()
            .ok_or_else(|| StateframeError::InvalidFormat(entry.format.clone())),
        None => Ok(Value::List(flat)),
    }
}

fn reshape(flat: Vec<Value>, shape: &[usize]) -> Result<Value> {
    let total = shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d));
    if total != Some(flat.len()) {
        return Err(StateframeError::ShapeMismatch {
            shape: shape.to_vec(),
            count: flat.len(),
        });
    }
    Ok(nest(&mut flat.into_iter(), shape))
}

fn nest<I: Iterator<Item = Value>>(items: &mut I, shape: &[usize]) -> Value {
    match shape.split_first() {
        None => items.next().unwrap_or(Value::List(Vec::new())),
        Some((&n, rest)) => Value::List((0..n).map(|_| nest(items, rest)).collect()),
    }
}

impl OffsetTable {
    pub fn extract(&self, buffer: &[u8], name: &str) -> Result<Value> {
        decode(buffer, self.get(name)?)
    }

    /// Decode every field in buffer order.
    pub fn decode_all(&self, buffer: &[u8]) -> Result<Vec<(String, Value)>> {
        self.entries
            .iter()
            .map(|(name, entry)| Ok((name.clone(), decode(buffer, entry)?)))
            .collect()
    }
}
