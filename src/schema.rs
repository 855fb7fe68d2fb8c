// src/schema.rs

//! Field tables for the TensorFlow messages nested under a `SavedModel`
//! that are not decoded into views: node attributes, function libraries,
//! saver, collection and signature definitions.
//!
//! [`check_message`] walks a body against a table and fails on anything a
//! protobuf parser would reject: bad framing, invalid UTF-8 in a string
//! field, a malformed nested message or packed array. Fields missing from a
//! table, and scalars, only get their framing checked.
//!
//! Not described here: `MetaGraphDef.object_graph_def` (the TF2 object graph),
//! the stack trace maps of `GraphDef.debug_info`, and
//! `CompositeTensor.type_spec` (a `struct.proto` value). Those are framing-only.

use crate::saved_model::SchemaError;
use crate::wire::{DecodeError, ProtoReader, Tag, WireType};

/// Nesting allowed below the outermost message, as in the reference protobuf
/// runtime.
pub const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum Scalar {
    Varint,
    Fixed32,
    Fixed64,
}

pub enum FieldKind {
    Message(&'static MessageSchema),
    Str,
    Bytes,
    /// Repeated numeric field in packed form.
    Packed(Scalar),
}

pub struct FieldSchema {
    pub number: u32,
    pub name: &'static str,
    pub repeated: bool,
    pub kind: FieldKind,
}

pub struct MessageSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSchema],
}

impl MessageSchema {
    fn field(&self, number: u32) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|f| f.number == number)
    }
}

const fn message(number: u32, name: &'static str, schema: &'static MessageSchema) -> FieldSchema {
    FieldSchema { number, name, repeated: false, kind: FieldKind::Message(schema) }
}

const fn messages(number: u32, name: &'static str, schema: &'static MessageSchema) -> FieldSchema {
    FieldSchema { number, name, repeated: true, kind: FieldKind::Message(schema) }
}

const fn string(number: u32, name: &'static str) -> FieldSchema {
    FieldSchema { number, name, repeated: false, kind: FieldKind::Str }
}

const fn bytes(number: u32, name: &'static str) -> FieldSchema {
    FieldSchema { number, name, repeated: false, kind: FieldKind::Bytes }
}

const fn packed(number: u32, name: &'static str, scalar: Scalar) -> FieldSchema {
    FieldSchema { number, name, repeated: true, kind: FieldKind::Packed(scalar) }
}

// tensorflow/core/framework

pub static TENSOR_SHAPE_DIM: MessageSchema =
    MessageSchema { name: "TensorShapeProto.Dim", fields: &[string(2, "name")] };

pub static TENSOR_SHAPE: MessageSchema = MessageSchema {
    name: "TensorShapeProto",
    fields: &[messages(2, "dim", &TENSOR_SHAPE_DIM)],
};

pub static DTYPE_AND_SHAPE: MessageSchema = MessageSchema {
    name: "ResourceHandleProto.DtypeAndShape",
    fields: &[message(2, "shape", &TENSOR_SHAPE)],
};

pub static RESOURCE_HANDLE: MessageSchema = MessageSchema {
    name: "ResourceHandleProto",
    fields: &[
        string(1, "device"),
        string(2, "container"),
        string(3, "name"),
        string(5, "maybe_type_name"),
        messages(6, "dtypes_and_shapes", &DTYPE_AND_SHAPE),
    ],
};

pub static VARIANT_TENSOR_DATA: MessageSchema = MessageSchema {
    name: "VariantTensorDataProto",
    fields: &[string(1, "type_name"), bytes(2, "metadata"), messages(3, "tensors", &TENSOR)],
};

pub static TENSOR: MessageSchema = MessageSchema {
    name: "TensorProto",
    fields: &[
        message(2, "tensor_shape", &TENSOR_SHAPE),
        bytes(4, "tensor_content"),
        packed(5, "float_val", Scalar::Fixed32),
        packed(6, "double_val", Scalar::Fixed64),
        packed(7, "int_val", Scalar::Varint),
        bytes(8, "string_val"),
        packed(9, "scomplex_val", Scalar::Fixed32),
        packed(10, "int64_val", Scalar::Varint),
        packed(11, "bool_val", Scalar::Varint),
        packed(12, "dcomplex_val", Scalar::Fixed64),
        packed(13, "half_val", Scalar::Varint),
        messages(14, "resource_handle_val", &RESOURCE_HANDLE),
        messages(15, "variant_val", &VARIANT_TENSOR_DATA),
        packed(16, "uint32_val", Scalar::Varint),
        packed(17, "uint64_val", Scalar::Varint),
    ],
};

pub static FULL_TYPE: MessageSchema = MessageSchema {
    name: "FullTypeDef",
    fields: &[messages(2, "args", &FULL_TYPE), string(3, "s")],
};

pub static ATTR_LIST: MessageSchema = MessageSchema {
    name: "AttrValue.ListValue",
    fields: &[
        bytes(2, "s"),
        packed(3, "i", Scalar::Varint),
        packed(4, "f", Scalar::Fixed32),
        packed(5, "b", Scalar::Varint),
        packed(6, "type", Scalar::Varint),
        messages(7, "shape", &TENSOR_SHAPE),
        messages(8, "tensor", &TENSOR),
        messages(9, "func", &NAME_ATTR_LIST),
    ],
};

pub static ATTR_VALUE: MessageSchema = MessageSchema {
    name: "AttrValue",
    fields: &[
        message(1, "list", &ATTR_LIST),
        bytes(2, "s"),
        message(7, "shape", &TENSOR_SHAPE),
        message(8, "tensor", &TENSOR),
        string(9, "placeholder"),
        message(10, "func", &NAME_ATTR_LIST),
    ],
};

/// Entry of a `map<string, AttrValue>`.
pub static ATTR_ENTRY: MessageSchema = MessageSchema {
    name: "AttrEntry",
    fields: &[string(1, "key"), message(2, "value", &ATTR_VALUE)],
};

pub static NAME_ATTR_LIST: MessageSchema = MessageSchema {
    name: "NameAttrList",
    fields: &[string(1, "name"), messages(2, "attr", &ATTR_ENTRY)],
};

pub static NODE_DEBUG_INFO: MessageSchema = MessageSchema {
    name: "NodeDef.ExperimentalDebugInfo",
    fields: &[string(1, "original_node_names"), string(2, "original_func_names")],
};

/// `NodeDef` fields that `saved_model` does not decode itself.
pub static NODE_DEF: MessageSchema = MessageSchema {
    name: "NodeDef",
    fields: &[
        messages(5, "attr", &ATTR_ENTRY),
        message(6, "experimental_debug_info", &NODE_DEBUG_INFO),
        message(7, "experimental_type", &FULL_TYPE),
    ],
};

/// `NodeDef` inside a function body, where every field is checked.
pub static FUNCTION_NODE_DEF: MessageSchema = MessageSchema {
    name: "NodeDef",
    fields: &[
        string(1, "name"),
        string(2, "op"),
        string(3, "input"),
        string(4, "device"),
        messages(5, "attr", &ATTR_ENTRY),
        message(6, "experimental_debug_info", &NODE_DEBUG_INFO),
        message(7, "experimental_type", &FULL_TYPE),
    ],
};

pub static ARG_DEF: MessageSchema = MessageSchema {
    name: "OpDef.ArgDef",
    fields: &[
        string(1, "name"),
        string(2, "description"),
        string(4, "type_attr"),
        string(5, "number_attr"),
        string(6, "type_list_attr"),
        messages(7, "handle_data", &DTYPE_AND_SHAPE),
        message(17, "experimental_full_type", &FULL_TYPE),
    ],
};

pub static ATTR_DEF: MessageSchema = MessageSchema {
    name: "OpDef.AttrDef",
    fields: &[
        string(1, "name"),
        string(2, "type"),
        message(3, "default_value", &ATTR_VALUE),
        string(4, "description"),
        message(7, "allowed_values", &ATTR_VALUE),
    ],
};

pub static OP_DEPRECATION: MessageSchema =
    MessageSchema { name: "OpDeprecation", fields: &[string(2, "explanation")] };

pub static OP_DEF: MessageSchema = MessageSchema {
    name: "OpDef",
    fields: &[
        string(1, "name"),
        messages(2, "input_arg", &ARG_DEF),
        messages(3, "output_arg", &ARG_DEF),
        messages(4, "attr", &ATTR_DEF),
        string(5, "summary"),
        string(6, "description"),
        message(8, "deprecation", &OP_DEPRECATION),
        string(20, "control_output"),
    ],
};

pub static OP_LIST: MessageSchema =
    MessageSchema { name: "OpList", fields: &[messages(1, "op", &OP_DEF)] };

/// Entry of a `map<string, string>`.
pub static STRING_ENTRY: MessageSchema =
    MessageSchema { name: "StringEntry", fields: &[string(1, "key"), string(2, "value")] };

pub static ARG_ATTRS: MessageSchema = MessageSchema {
    name: "FunctionDef.ArgAttrs",
    fields: &[messages(1, "attr", &ATTR_ENTRY)],
};

/// Entry of `map<uint32, ArgAttrs>`; the key is a varint.
pub static ARG_ATTR_ENTRY: MessageSchema =
    MessageSchema { name: "ArgAttrEntry", fields: &[message(2, "value", &ARG_ATTRS)] };

pub static FUNCTION_DEF: MessageSchema = MessageSchema {
    name: "FunctionDef",
    fields: &[
        message(1, "signature", &OP_DEF),
        messages(3, "node_def", &FUNCTION_NODE_DEF),
        messages(4, "ret", &STRING_ENTRY),
        messages(5, "attr", &ATTR_ENTRY),
        messages(6, "control_ret", &STRING_ENTRY),
        messages(7, "arg_attr", &ARG_ATTR_ENTRY),
    ],
};

pub static GRADIENT_DEF: MessageSchema = MessageSchema {
    name: "GradientDef",
    fields: &[string(1, "function_name"), string(2, "gradient_func")],
};

pub static REGISTERED_GRADIENT: MessageSchema = MessageSchema {
    name: "RegisteredGradient",
    fields: &[string(1, "gradient_func"), string(2, "registered_op_type")],
};

pub static FUNCTION_LIBRARY: MessageSchema = MessageSchema {
    name: "FunctionDefLibrary",
    fields: &[
        messages(1, "function", &FUNCTION_DEF),
        messages(2, "gradient", &GRADIENT_DEF),
        messages(3, "registered_gradients", &REGISTERED_GRADIENT),
    ],
};

pub static GRAPH_DEBUG_INFO: MessageSchema =
    MessageSchema { name: "GraphDebugInfo", fields: &[string(1, "files")] };

/// `GraphDef` fields that `saved_model` does not decode itself.
pub static GRAPH_DEF: MessageSchema = MessageSchema {
    name: "GraphDef",
    fields: &[
        message(2, "library", &FUNCTION_LIBRARY),
        message(5, "debug_info", &GRAPH_DEBUG_INFO),
    ],
};

// tensorflow/core/protobuf

pub static ANY: MessageSchema =
    MessageSchema { name: "Any", fields: &[string(1, "type_url"), bytes(2, "value")] };

/// `MetaInfoDef` fields that `saved_model` does not decode itself.
pub static META_INFO_DEF: MessageSchema = MessageSchema {
    name: "MetaInfoDef",
    fields: &[
        message(2, "stripped_op_list", &OP_LIST),
        message(3, "any_info", &ANY),
        messages(8, "function_aliases", &STRING_ENTRY),
    ],
};

pub static SAVER_DEF: MessageSchema = MessageSchema {
    name: "SaverDef",
    fields: &[
        string(1, "filename_tensor_name"),
        string(2, "save_tensor_name"),
        string(3, "restore_op_name"),
    ],
};

pub static NODE_LIST: MessageSchema =
    MessageSchema { name: "CollectionDef.NodeList", fields: &[string(1, "value")] };

pub static BYTES_LIST: MessageSchema =
    MessageSchema { name: "CollectionDef.BytesList", fields: &[bytes(1, "value")] };

pub static INT64_LIST: MessageSchema = MessageSchema {
    name: "CollectionDef.Int64List",
    fields: &[packed(1, "value", Scalar::Varint)],
};

pub static FLOAT_LIST: MessageSchema = MessageSchema {
    name: "CollectionDef.FloatList",
    fields: &[packed(1, "value", Scalar::Fixed32)],
};

pub static ANY_LIST: MessageSchema =
    MessageSchema { name: "CollectionDef.AnyList", fields: &[messages(1, "value", &ANY)] };

pub static COLLECTION_DEF: MessageSchema = MessageSchema {
    name: "CollectionDef",
    fields: &[
        message(1, "node_list", &NODE_LIST),
        message(2, "bytes_list", &BYTES_LIST),
        message(3, "int64_list", &INT64_LIST),
        message(4, "float_list", &FLOAT_LIST),
        message(5, "any_list", &ANY_LIST),
    ],
};

pub static COLLECTION_ENTRY: MessageSchema = MessageSchema {
    name: "CollectionEntry",
    fields: &[string(1, "key"), message(2, "value", &COLLECTION_DEF)],
};

pub static COO_SPARSE: MessageSchema = MessageSchema {
    name: "TensorInfo.CooSparse",
    fields: &[
        string(1, "values_tensor_name"),
        string(2, "indices_tensor_name"),
        string(3, "dense_shape_tensor_name"),
    ],
};

pub static COMPOSITE_TENSOR: MessageSchema = MessageSchema {
    name: "TensorInfo.CompositeTensor",
    fields: &[messages(2, "components", &TENSOR_INFO)],
};

pub static TENSOR_INFO: MessageSchema = MessageSchema {
    name: "TensorInfo",
    fields: &[
        string(1, "name"),
        message(3, "tensor_shape", &TENSOR_SHAPE),
        message(4, "coo_sparse", &COO_SPARSE),
        message(5, "composite_tensor", &COMPOSITE_TENSOR),
    ],
};

pub static TENSOR_INFO_ENTRY: MessageSchema = MessageSchema {
    name: "TensorInfoEntry",
    fields: &[string(1, "key"), message(2, "value", &TENSOR_INFO)],
};

pub static TENSOR_ENTRY: MessageSchema = MessageSchema {
    name: "TensorEntry",
    fields: &[string(1, "key"), message(2, "value", &TENSOR)],
};

pub static SIGNATURE_DEF: MessageSchema = MessageSchema {
    name: "SignatureDef",
    fields: &[
        messages(1, "inputs", &TENSOR_INFO_ENTRY),
        messages(2, "outputs", &TENSOR_INFO_ENTRY),
        string(3, "method_name"),
        messages(4, "defaults", &TENSOR_ENTRY),
    ],
};

/// Entry of `map<string, SignatureDef>`; `saved_model` reads the key itself.
pub static SIGNATURE_ENTRY: MessageSchema =
    MessageSchema { name: "SignatureEntry", fields: &[message(2, "value", &SIGNATURE_DEF)] };

pub static ASSET_FILE_DEF: MessageSchema = MessageSchema {
    name: "AssetFileDef",
    fields: &[message(1, "tensor_info", &TENSOR_INFO), string(2, "filename")],
};

/// `MetaGraphDef` fields that `saved_model` does not decode itself.
pub static META_GRAPH_DEF: MessageSchema = MessageSchema {
    name: "MetaGraphDef",
    fields: &[
        message(3, "saver_def", &SAVER_DEF),
        messages(4, "collection_def", &COLLECTION_ENTRY),
        messages(6, "asset_file_def", &ASSET_FILE_DEF),
    ],
};

/// Checks the fields of one message as they are read, numbering repeated
/// message fields for error paths.
pub struct FieldChecker {
    schema: &'static MessageSchema,
    depth: usize,
    seen: Vec<(u32, usize)>,
}

impl FieldChecker {
    /// `depth` is the nesting level of the message whose fields are checked,
    /// counting the outermost message as 1.
    pub fn new(schema: &'static MessageSchema, depth: usize) -> Self {
        Self { schema, depth, seen: Vec::new() }
    }

    pub fn check(&mut self, r: &mut ProtoReader<'_>, tag: Tag) -> Result<(), SchemaError> {
        let field = match self.schema.field(tag.field) {
            Some(field) if tag.wire_type == WireType::LengthDelimited => field,
            // unknown field, or a scalar
            _ => return r.skip_field(tag).map_err(SchemaError::from),
        };

        let segment = if field.repeated {
            format!("{}[{}]", field.name, self.next_index(field.number))
        } else {
            field.name.to_string()
        };

        let checked = match field.kind {
            FieldKind::Str => r.read_string().map(|_| ()).map_err(SchemaError::from),
            FieldKind::Bytes => r.read_bytes().map(|_| ()).map_err(SchemaError::from),
            FieldKind::Packed(scalar) => check_packed(r, scalar).map_err(SchemaError::from),
            FieldKind::Message(inner) => {
                if self.depth >= MAX_DEPTH {
                    return Err(SchemaError::from(DecodeError::RecursionLimit {
                        offset: r.offset(),
                        limit: MAX_DEPTH,
                    })
                    .within(&segment));
                }
                r.read_message()
                    .map_err(SchemaError::from)
                    .and_then(|body| check_message(body, inner, self.depth + 1))
            }
        };
        checked.map_err(|e| e.within(&segment))
    }

    fn next_index(&mut self, number: u32) -> usize {
        match self.seen.iter_mut().find(|(n, _)| *n == number) {
            Some((_, count)) => {
                let index = *count;
                *count += 1;
                index
            }
            None => {
                self.seen.push((number, 1));
                0
            }
        }
    }
}

/// Checks a whole message body against `schema`.
pub fn check_message(
    mut r: ProtoReader<'_>,
    schema: &'static MessageSchema,
    depth: usize,
) -> Result<(), SchemaError> {
    let mut checker = FieldChecker::new(schema, depth);
    while !r.is_empty() {
        let tag = r.read_tag()?;
        checker.check(&mut r, tag)?;
    }
    Ok(())
}

fn check_packed(r: &mut ProtoReader<'_>, scalar: Scalar) -> Result<(), DecodeError> {
    let mut values = r.read_message()?;
    while !values.is_empty() {
        match scalar {
            Scalar::Varint => {
                values.read_varint()?;
            }
            Scalar::Fixed32 => {
                values.read_fixed32()?;
            }
            Scalar::Fixed64 => {
                values.read_fixed64()?;
            }
        }
    }
    Ok(())
}
