// src/saved_model.rs

//! Structural view of the TensorFlow `SavedModel` container.
//!
//! Only the fields needed to pick a meta graph and describe its graph are
//! decoded. The rest of each message is checked against the tables in
//! `schema` and otherwise ignored. Decoded views borrow
//! from the input buffer, and a graph keeps the exact bytes it was encoded
//! with so it can be written out unchanged.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use crate::schema::{self, FieldChecker};
use crate::wire::{DecodeError, ProtoReader, Tag, WireType};

// SavedModel
const SCHEMA_VERSION: u32 = 1;
const META_GRAPHS: u32 = 2;
// MetaGraphDef
const META_INFO_DEF: u32 = 1;
const GRAPH_DEF: u32 = 2;
const SIGNATURE_DEF: u32 = 5;
// MetaInfoDef
const META_GRAPH_VERSION: u32 = 1;
const TAGS: u32 = 4;
const TENSORFLOW_VERSION: u32 = 5;
const TENSORFLOW_GIT_VERSION: u32 = 6;
// GraphDef
const NODE: u32 = 1;
const LEGACY_VERSION: u32 = 3;
const VERSIONS: u32 = 4;
// NodeDef
const NODE_NAME: u32 = 1;
const NODE_OP: u32 = 2;
const NODE_INPUT: u32 = 3;
const NODE_DEVICE: u32 = 4;
// VersionDef
const PRODUCER: u32 = 1;
const MIN_CONSUMER: u32 = 2;
const BAD_CONSUMERS: u32 = 3;
// map<string, SignatureDef> entry
const MAP_KEY: u32 = 1;

/// Wire error plus the place in the schema where it happened,
/// e.g. `SavedModel.meta_graphs[0].graph_def.node[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    path: String,
    source: DecodeError,
}

impl SchemaError {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn decode_error(&self) -> &DecodeError {
        &self.source
    }

    pub(crate) fn within(mut self, segment: &str) -> Self {
        self.path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", segment, self.path)
        };
        self
    }
}

impl From<DecodeError> for SchemaError {
    fn from(source: DecodeError) -> Self {
        SchemaError { path: String::new(), source }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "malformed message")
        } else {
            write!(f, "malformed {}", self.path)
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedModel<'a> {
    pub schema_version: i64,
    pub meta_graphs: Vec<MetaGraph<'a>>,
}

impl<'a> SavedModel<'a> {
    /// Decodes a whole container, including every meta graph and its graph.
    pub fn decode(bytes: &'a [u8]) -> Result<SavedModel<'a>, SchemaError> {
        decode_saved_model(ProtoReader::new(bytes)).map_err(|e| e.within("SavedModel"))
    }

    /// Tag sets of all meta graphs, in container order.
    pub fn tag_sets(&self) -> Vec<Vec<&'a str>> {
        self.meta_graphs.iter().map(|mg| mg.meta_info.tags.clone()).collect()
    }

    /// Index of the first meta graph whose tag set equals `wanted`,
    /// ignoring order and duplicates.
    pub fn find_by_tags<S: AsRef<str>>(&self, wanted: &[S]) -> Option<usize> {
        let wanted: BTreeSet<&str> = wanted.iter().map(|t| t.as_ref()).collect();
        self.meta_graphs
            .iter()
            .position(|mg| mg.meta_info.tags.iter().copied().collect::<BTreeSet<&str>>() == wanted)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaGraph<'a> {
    pub meta_info: MetaInfo<'a>,
    pub graph: GraphDef<'a>,
    pub signature_keys: Vec<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaInfo<'a> {
    pub meta_graph_version: &'a str,
    pub tags: Vec<&'a str>,
    pub tensorflow_version: &'a str,
    pub tensorflow_git_version: &'a str,
}

/// A computation graph. `encoded` holds every occurrence of the field in
/// the parent, which protobuf merges by concatenation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDef<'a> {
    encoded: Vec<&'a [u8]>,
    pub nodes: Vec<NodeDef<'a>>,
    pub versions: Option<VersionDef>,
    pub legacy_version: i32,
}

impl<'a> GraphDef<'a> {
    /// Decodes a standalone serialized graph, such as a written `frozen_graph.pb`.
    pub fn decode(bytes: &'a [u8]) -> Result<GraphDef<'a>, SchemaError> {
        let mut graph = GraphDef::default();
        merge_graph_def(&mut graph, ProtoReader::new(bytes), 1).map_err(|e| e.within("GraphDef"))?;
        Ok(graph)
    }

    /// Serialized form of the graph. Borrowed unless the field was split
    /// across several occurrences. An absent graph encodes to no bytes.
    pub fn to_bytes(&self) -> Cow<'a, [u8]> {
        match self.encoded.as_slice() {
            [] => Cow::Borrowed(&[][..]),
            [single] => Cow::Borrowed(*single),
            parts => Cow::Owned(parts.concat()),
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.encoded.iter().map(|part| part.len()).sum()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.nodes.iter().map(|node| node.name)
    }

    pub fn producer(&self) -> Option<i32> {
        self.versions.as_ref().map(|v| v.producer)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDef<'a> {
    pub name: &'a str,
    pub op: &'a str,
    pub inputs: Vec<&'a str>,
    pub device: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDef {
    pub producer: i32,
    pub min_consumer: i32,
    pub bad_consumers: Vec<i32>,
}

fn is_len(tag: Tag) -> bool {
    tag.wire_type == WireType::LengthDelimited
}

fn is_varint(tag: Tag) -> bool {
    tag.wire_type == WireType::Varint
}

fn decode_saved_model<'a>(mut r: ProtoReader<'a>) -> Result<SavedModel<'a>, SchemaError> {
    let mut model = SavedModel::default();
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            SCHEMA_VERSION if is_varint(tag) => model.schema_version = r.read_varint()? as i64,
            META_GRAPHS if is_len(tag) => {
                let index = model.meta_graphs.len();
                let body = r.read_message()?;
                let meta_graph = decode_meta_graph(body, 2)
                    .map_err(|e| e.within(&format!("meta_graphs[{}]", index)))?;
                model.meta_graphs.push(meta_graph);
            }
            _ => r.skip_field(tag)?,
        }
    }
    Ok(model)
}

fn decode_meta_graph<'a>(mut r: ProtoReader<'a>, depth: usize) -> Result<MetaGraph<'a>, SchemaError> {
    let mut meta_graph = MetaGraph::default();
    let mut rest = FieldChecker::new(&schema::META_GRAPH_DEF, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            META_INFO_DEF if is_len(tag) => {
                let body = r.read_message()?;
                merge_meta_info(&mut meta_graph.meta_info, body, depth + 1)
                    .map_err(|e| e.within("meta_info_def"))?;
            }
            GRAPH_DEF if is_len(tag) => {
                let body = r.read_message()?;
                merge_graph_def(&mut meta_graph.graph, body, depth + 1)
                    .map_err(|e| e.within("graph_def"))?;
            }
            SIGNATURE_DEF if is_len(tag) => {
                let index = meta_graph.signature_keys.len();
                let body = r.read_message()?;
                let key = decode_signature_entry(body, depth + 1)
                    .map_err(|e| e.within(&format!("signature_def[{}]", index)))?;
                meta_graph.signature_keys.push(key);
            }
            _ => rest.check(&mut r, tag)?,
        }
    }
    Ok(meta_graph)
}

fn merge_meta_info<'a>(
    info: &mut MetaInfo<'a>,
    mut r: ProtoReader<'a>,
    depth: usize,
) -> Result<(), SchemaError> {
    let mut rest = FieldChecker::new(&schema::META_INFO_DEF, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            META_GRAPH_VERSION if is_len(tag) => info.meta_graph_version = r.read_string()?,
            TAGS if is_len(tag) => info.tags.push(r.read_string()?),
            TENSORFLOW_VERSION if is_len(tag) => info.tensorflow_version = r.read_string()?,
            TENSORFLOW_GIT_VERSION if is_len(tag) => info.tensorflow_git_version = r.read_string()?,
            _ => rest.check(&mut r, tag)?,
        }
    }
    Ok(())
}

fn merge_graph_def<'a>(
    graph: &mut GraphDef<'a>,
    mut r: ProtoReader<'a>,
    depth: usize,
) -> Result<(), SchemaError> {
    graph.encoded.push(r.as_slice());
    let mut rest = FieldChecker::new(&schema::GRAPH_DEF, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            NODE if is_len(tag) => {
                let index = graph.nodes.len();
                let body = r.read_message()?;
                let node = decode_node(body, depth + 1)
                    .map_err(|e| e.within(&format!("node[{}]", index)))?;
                graph.nodes.push(node);
            }
            VERSIONS if is_len(tag) => {
                let body = r.read_message()?;
                let versions = graph.versions.get_or_insert_with(VersionDef::default);
                merge_versions(versions, body).map_err(|e| e.within("versions"))?;
            }
            LEGACY_VERSION if is_varint(tag) => graph.legacy_version = r.read_varint()? as i32,
            _ => rest.check(&mut r, tag)?,
        }
    }
    Ok(())
}

fn decode_node<'a>(mut r: ProtoReader<'a>, depth: usize) -> Result<NodeDef<'a>, SchemaError> {
    let mut node = NodeDef::default();
    let mut rest = FieldChecker::new(&schema::NODE_DEF, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            NODE_NAME if is_len(tag) => node.name = r.read_string()?,
            NODE_OP if is_len(tag) => node.op = r.read_string()?,
            NODE_INPUT if is_len(tag) => node.inputs.push(r.read_string()?),
            NODE_DEVICE if is_len(tag) => node.device = r.read_string()?,
            _ => rest.check(&mut r, tag)?,
        }
    }
    Ok(node)
}

fn merge_versions(versions: &mut VersionDef, mut r: ProtoReader<'_>) -> Result<(), SchemaError> {
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            PRODUCER if is_varint(tag) => versions.producer = r.read_varint()? as i32,
            MIN_CONSUMER if is_varint(tag) => versions.min_consumer = r.read_varint()? as i32,
            BAD_CONSUMERS if is_varint(tag) => versions.bad_consumers.push(r.read_varint()? as i32),
            BAD_CONSUMERS if is_len(tag) => {
                // packed
                let mut packed = r.read_message()?;
                while !packed.is_empty() {
                    versions.bad_consumers.push(packed.read_varint()? as i32);
                }
            }
            _ => r.skip_field(tag)?,
        }
    }
    Ok(())
}

/// Reads the key of a `signature_def` map entry and checks its value.
fn decode_signature_entry<'a>(mut r: ProtoReader<'a>, depth: usize) -> Result<&'a str, SchemaError> {
    let mut key = "";
    let mut value = FieldChecker::new(&schema::SIGNATURE_ENTRY, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        match tag.field {
            MAP_KEY if is_len(tag) => key = r.read_string()?,
            _ => value.check(&mut r, tag)?,
        }
    }
    Ok(key)
}
