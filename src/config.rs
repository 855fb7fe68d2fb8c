// src/config.rs

use std::path::{Path, PathBuf};

/// Name of the container inside an export directory.
pub const SAVED_MODEL_FILE_NAME: &str = "saved_model.pb";
/// Name of the file written into the output directory.
pub const FROZEN_GRAPH_FILE_NAME: &str = "frozen_graph.pb";

/// Which meta graph of the container gets unwrapped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MetaGraphSelector {
    #[default]
    First,
    Index(usize),
    /// First meta graph whose tag set equals this one, order-insensitive.
    Tags(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertConfig {
    pub model_path: PathBuf,
    pub output_dir: PathBuf,
    pub selector: MetaGraphSelector,
}

impl ConvertConfig {
    pub fn new(model_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            output_dir: output_dir.into(),
            selector: MetaGraphSelector::First,
        }
    }

    pub fn with_selector(mut self, selector: MetaGraphSelector) -> Self {
        self.selector = selector;
        self
    }

    /// The container file to read. A directory means an export directory,
    /// so the conventional file inside it is used.
    pub fn resolve_input_path(&self) -> PathBuf {
        if self.model_path.is_dir() {
            self.model_path.join(SAVED_MODEL_FILE_NAME)
        } else {
            self.model_path.clone()
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(FROZEN_GRAPH_FILE_NAME)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
