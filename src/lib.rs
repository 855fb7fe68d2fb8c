// src/lib.rs

//! Unwraps the graph of a TensorFlow SavedModel into a standalone
//! `frozen_graph.pb` for runtimes that only load a bare GraphDef.

pub mod cli;
pub mod config;
pub mod converter;
pub mod saved_model;
pub mod schema;
pub mod wire;

pub use config::{ConvertConfig, MetaGraphSelector};
pub use converter::{convert, ConversionReport, ConvertError};
