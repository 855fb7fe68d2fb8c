// src/cli.rs

use clap::Parser;
use log::debug;
use std::error::Error;
use std::path::PathBuf;

use crate::config::{ConvertConfig, MetaGraphSelector};
use crate::converter::{self, ConversionReport, ConvertError};

/// Extract the frozen GraphDef from a TensorFlow SavedModel.
#[derive(Parser, Debug)]
#[clap(name = "freeze_saved_model", author, version, long_about = None)]
pub struct CliArgs {
    /// SavedModel file, or an export directory containing saved_model.pb
    #[clap(long = "model_dir", visible_alias = "model-dir", value_parser)]
    pub model_dir: PathBuf,
    /// Existing directory that receives frozen_graph.pb
    #[clap(long = "output_dir", visible_alias = "output-dir", value_parser)]
    pub output_dir: PathBuf,

    /// Position of the meta graph to extract (default: 0)
    #[clap(
        long = "meta_graph_index",
        visible_alias = "meta-graph-index",
        value_parser,
        conflicts_with = "tags"
    )]
    pub meta_graph_index: Option<usize>,
    /// Extract the first meta graph with exactly this tag set, e.g. `serve`
    #[clap(long, value_parser = parse_tag, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Print the node names of the extracted graph
    #[clap(long = "list_nodes", visible_alias = "list-nodes")]
    pub list_nodes: bool,
    /// Print a JSON summary of the conversion
    #[clap(long)]
    pub summary: bool,
}

fn parse_tag(s: &str) -> Result<String, String> {
    let tag = s.trim();
    if tag.is_empty() {
        return Err("tags must not be empty".to_string());
    }
    Ok(tag.to_string())
}

impl CliArgs {
    pub fn selector(&self) -> MetaGraphSelector {
        if !self.tags.is_empty() {
            MetaGraphSelector::Tags(self.tags.clone())
        } else if let Some(index) = self.meta_graph_index {
            MetaGraphSelector::Index(index)
        } else {
            MetaGraphSelector::First
        }
    }

    pub fn to_config(&self) -> ConvertConfig {
        ConvertConfig::new(&self.model_dir, &self.output_dir).with_selector(self.selector())
    }
}

/// Runs one conversion for already-parsed arguments.
pub fn run(args: &CliArgs) -> Result<ConversionReport, ConvertError> {
    let config = args.to_config();
    debug!("Conversion config: {:?}", config);
    converter::convert(&config)
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    let report = run(&args)?;

    if args.list_nodes {
        for name in &report.node_names {
            println!("{}", name);
        }
    }
    if args.summary {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
