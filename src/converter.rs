// src/converter.rs

use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config::{ConvertConfig, MetaGraphSelector, FROZEN_GRAPH_FILE_NAME};
use crate::saved_model::{SavedModel, SchemaError};

#[derive(Debug)]
pub enum ConvertError {
    ReadInput { path: PathBuf, source: io::Error },
    Decode { path: PathBuf, source: SchemaError },
    NoMetaGraphs,
    MetaGraphIndexOutOfRange { index: usize, count: usize },
    NoMatchingMetaGraph { wanted: Vec<String>, available: Vec<Vec<String>> },
    WriteOutput { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::ReadInput { path, .. } => {
                write!(f, "failed to read SavedModel '{}'", path.display())
            }
            ConvertError::Decode { path, .. } => {
                write!(f, "'{}' is not a well-formed SavedModel", path.display())
            }
            ConvertError::NoMetaGraphs => write!(f, "SavedModel contains no meta graphs"),
            ConvertError::MetaGraphIndexOutOfRange { index, count } => write!(
                f,
                "meta graph index {} is out of range, SavedModel has {} meta graph(s)",
                index, count
            ),
            ConvertError::NoMatchingMetaGraph { wanted, available } => write!(
                f,
                "no meta graph has tags {:?}, available tag sets: {:?}",
                wanted, available
            ),
            ConvertError::WriteOutput { path, .. } => {
                write!(f, "failed to write frozen graph '{}'", path.display())
            }
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::ReadInput { source, .. } => Some(source),
            ConvertError::Decode { source, .. } => Some(source),
            ConvertError::WriteOutput { source, .. } => Some(source),
            ConvertError::NoMetaGraphs
            | ConvertError::MetaGraphIndexOutOfRange { .. }
            | ConvertError::NoMatchingMetaGraph { .. } => None,
        }
    }
}

/// What a successful conversion produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub output_path: PathBuf,
    pub bytes_written: usize,
    pub schema_version: i64,
    pub meta_graph_count: usize,
    pub meta_graph_index: usize,
    pub tags: Vec<String>,
    pub node_count: usize,
    pub producer: Option<i32>,
    #[serde(skip_serializing)]
    pub node_names: Vec<String>,
}

/// Reads the container named by `config`, unwraps the selected meta graph's
/// graph and writes it to `<output_dir>/frozen_graph.pb`.
///
/// Nothing is written unless every earlier step succeeded.
pub fn convert(config: &ConvertConfig) -> Result<ConversionReport, ConvertError> {
    let input_path = config.resolve_input_path();
    let data = read_input(&input_path)?;
    info!("Read {} bytes from {}", data.len(), input_path.display());

    let model = SavedModel::decode(&data).map_err(|source| ConvertError::Decode {
        path: input_path.clone(),
        source,
    })?;
    info!(
        "Decoded SavedModel (schema version {}) with {} meta graph(s)",
        model.schema_version,
        model.meta_graphs.len()
    );

    let index = select_meta_graph(&model, &config.selector)?;
    let meta_graph = &model.meta_graphs[index];
    let graph = &meta_graph.graph;
    info!(
        "Selected meta graph {} with tags {:?} ({} nodes)",
        index,
        meta_graph.meta_info.tags,
        graph.nodes.len()
    );
    if graph.nodes.is_empty() {
        warn!("Meta graph {} has an empty graph", index);
    }

    let graph_bytes = graph.to_bytes();
    let output_path = config.output_path();
    write_frozen_graph(config.output_dir(), &output_path, &graph_bytes)?;
    info!("Wrote {} bytes to {}", graph_bytes.len(), output_path.display());

    Ok(ConversionReport {
        output_path,
        bytes_written: graph_bytes.len(),
        schema_version: model.schema_version,
        meta_graph_count: model.meta_graphs.len(),
        meta_graph_index: index,
        tags: meta_graph.meta_info.tags.iter().map(|t| t.to_string()).collect(),
        node_count: graph.nodes.len(),
        producer: graph.producer(),
        node_names: graph.node_names().map(str::to_string).collect(),
    })
}

/// Resolves `selector` against the decoded container. An empty container is
/// always `NoMetaGraphs`.
pub fn select_meta_graph(
    model: &SavedModel<'_>,
    selector: &MetaGraphSelector,
) -> Result<usize, ConvertError> {
    let count = model.meta_graphs.len();
    if count == 0 {
        return Err(ConvertError::NoMetaGraphs);
    }
    match selector {
        MetaGraphSelector::First => Ok(0),
        MetaGraphSelector::Index(index) if *index < count => Ok(*index),
        MetaGraphSelector::Index(index) => {
            Err(ConvertError::MetaGraphIndexOutOfRange { index: *index, count })
        }
        MetaGraphSelector::Tags(wanted) => {
            model.find_by_tags(wanted).ok_or_else(|| ConvertError::NoMatchingMetaGraph {
                wanted: wanted.clone(),
                available: model
                    .tag_sets()
                    .into_iter()
                    .map(|set| set.into_iter().map(str::to_string).collect())
                    .collect(),
            })
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>, ConvertError> {
    let read = || -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    };
    read().map_err(|source| ConvertError::ReadInput { path: path.to_path_buf(), source })
}

/// Writes through a sibling temporary file and renames it over `target`, so
/// a failed run never leaves a truncated frozen graph behind.
fn write_frozen_graph(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let partial = dir.join(format!(".{}.partial", FROZEN_GRAPH_FILE_NAME));
    debug!("Writing to temporary file {}", partial.display());

    let write = || -> io::Result<()> {
        let mut file = File::create(&partial)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&partial, target)
    };

    write().map_err(|source| {
        if partial.exists() {
            if let Err(e) = fs::remove_file(&partial) {
                warn!("Could not remove temporary file {}: {}", partial.display(), e);
            }
        }
        ConvertError::WriteOutput { path: target.to_path_buf(), source }
    })
}
