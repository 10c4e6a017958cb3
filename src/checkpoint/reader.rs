//! Source checkpoint loading.

use crate::config::ModelSize;
use crate::error::{ConvertError, Result};
use crate::tensor::decode_view;
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const OPTIMIZER_SUFFIXES: &[&str] = &["adam_m", "adam_v"];
const SCALAR_NAMES: &[&str] = &["global_step", "generator_predictions/temperature"];

/// Whether a variable carries no model weight and must never reach mapping.
#[must_use]
pub fn is_filtered(name: &str) -> bool {
    OPTIMIZER_SUFFIXES.iter().any(|s| name.ends_with(s)) || SCALAR_NAMES.contains(&name)
}

/// Index file name of a size tier inside a checkpoint directory.
#[must_use]
pub fn index_file_name(size: ModelSize) -> String {
    format!("electra_{size}.safetensors")
}

/// Immutable source tensors keyed by their TF variable names.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    tensors: BTreeMap<String, ArrayD<f32>>,
    skipped: Vec<String>,
}

impl Checkpoint {
    /// Open `electra_<size>.safetensors` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, size: ModelSize) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConvertError::checkpoint(dir, "not a readable directory"));
        }
        Self::from_file(dir.join(index_file_name(size)))
    }

    /// Load a SafeTensors variable index.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| {
                ConvertError::checkpoint(path, format!("cannot read variable index: {e}"))
            })?;

        let file = safetensors::SafeTensors::deserialize(&data)
            .map_err(|e| ConvertError::checkpoint(path, format!("invalid variable index: {e}")))?;

        let mut tensors = BTreeMap::new();
        let mut skipped = Vec::new();
        for name in file.names() {
            if is_filtered(name) {
                skipped.push(name.to_string());
                continue;
            }
            let view = file
                .tensor(name)
                .map_err(|e| ConvertError::checkpoint(path, format!("variable '{name}': {e}")))?;
            let tensor = decode_view(&view).map_err(|message| {
                ConvertError::checkpoint(path, format!("variable '{name}': {message}"))
            })?;
            tensors.insert(name.to_string(), tensor);
        }
        skipped.sort();

        if tensors.is_empty() {
            return Err(ConvertError::checkpoint(path, "no model variables in checkpoint"));
        }

        tracing::debug!(
            path = %path.display(),
            variables = tensors.len(),
            skipped = skipped.len(),
            "loaded checkpoint"
        );

        Ok(Self {
            path: path.to_path_buf(),
            tensors,
            skipped,
        })
    }

    /// Build a checkpoint from in-memory tensors, applying the same filter.
    pub fn from_tensors(tensors: impl IntoIterator<Item = (String, ArrayD<f32>)>) -> Self {
        let mut kept = BTreeMap::new();
        let mut skipped = Vec::new();
        for (name, tensor) in tensors {
            if is_filtered(&name) {
                skipped.push(name);
            } else {
                kept.insert(name, tensor);
            }
        }
        skipped.sort();
        Self {
            path: PathBuf::from("<memory>"),
            tensors: kept,
            skipped,
        }
    }

    /// Look up a tensor by source name.
    pub fn get(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.tensors
            .get(name)
            .ok_or_else(|| {
                ConvertError::checkpoint(&self.path, format!("no variable named '{name}'"))
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Variable names, sorted lexicographically.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tensors.keys().cloned().collect()
    }

    /// Names dropped by the optimizer-state and scalar filter.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}
