// Fixture builders shared by the integration tests.
#![allow(dead_code)]

use saved_model_freezer::wire::ProtoWriter;

pub fn graph_bytes(nodes: &[(&str, &str)]) -> Vec<u8> {
    let mut w = ProtoWriter::new();
    for (name, op) in nodes {
        w.message_field(1, |n| {
            n.string_field(1, name).string_field(2, op);
        });
    }
    w.message_field(4, |v| {
        v.varint_field(1, 27);
    });
    w.into_bytes()
}

/// A SavedModel holding one meta graph per `(tags, graph)` pair.
pub fn saved_model_bytes(meta_graphs: &[(Vec<&str>, Vec<u8>)]) -> Vec<u8> {
    let mut w = ProtoWriter::new();
    w.varint_field(1, 1);
    for (tags, graph) in meta_graphs {
        w.message_field(2, |mg| {
            mg.message_field(1, |info| {
                info.string_field(1, "v1");
                for tag in tags {
                    info.string_field(4, tag);
                }
            })
            .bytes_field(2, graph);
        });
    }
    w.into_bytes()
}

/// A graph whose nodes carry nested attributes: a dtype, a shape list and a
/// small constant tensor.
pub fn graph_with_attrs_bytes() -> Vec<u8> {
    let mut w = ProtoWriter::new();
    w.message_field(1, |n| {
        n.string_field(1, "input")
            .string_field(2, "Placeholder")
            .message_field(5, |entry| {
                entry.string_field(1, "dtype").message_field(2, |v| {
                    v.varint_field(6, 1);
                });
            })
            .message_field(5, |entry| {
                entry.string_field(1, "_output_shapes").message_field(2, |v| {
                    v.message_field(1, |list| {
                        list.message_field(7, |shape| {
                            shape.message_field(2, |dim| {
                                dim.int_field(1, -1).string_field(2, "batch");
                            });
                            shape.message_field(2, |dim| {
                                dim.varint_field(1, 3);
                            });
                        });
                    });
                });
            });
    });
    w.message_field(1, |n| {
        n.string_field(1, "scale")
            .string_field(2, "Const")
            .message_field(5, |entry| {
                entry.string_field(1, "value").message_field(2, |v| {
                    v.message_field(8, |tensor| {
                        tensor
                            .varint_field(1, 1)
                            .message_field(2, |shape| {
                                shape.message_field(2, |dim| {
                                    dim.varint_field(1, 2);
                                });
                            })
                            .message_field(5, |floats| {
                                floats.raw(&0.5f32.to_le_bytes()).raw(&2.0f32.to_le_bytes());
                            });
                    });
                });
            });
    });
    w.message_field(1, |n| {
        n.string_field(1, "output")
            .string_field(2, "Mul")
            .string_field(3, "input")
            .string_field(3, "scale");
    });
    w.message_field(4, |v| {
        v.varint_field(1, 27);
    });
    w.into_bytes()
}
