//! Providers of source architecture configs.

use crate::config::{ModelSize, SourceConfig};
use crate::error::{ConvertError, Result};
use std::path::{Path, PathBuf};

/// Given a size tier, return the source architecture config.
pub trait ArchitectureProvider {
    fn architecture(&self, size: ModelSize) -> Result<SourceConfig>;
}

/// Published ELECTRA pretraining configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElectraPresets;

impl ArchitectureProvider for ElectraPresets {
    fn architecture(&self, size: ModelSize) -> Result<SourceConfig> {
        Ok(SourceConfig::preset(size))
    }
}

/// Architecture read from a JSON file.
///
/// The file holds either a single config or an object keyed by size tier
/// (`{"small": {...}, "base": {...}}`).
#[derive(Debug, Clone)]
pub struct JsonArchitecture {
    path: PathBuf,
}

impl JsonArchitecture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchitectureProvider for JsonArchitecture {
    fn architecture(&self, size: ModelSize) -> Result<SourceConfig> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ConvertError::io(format!("reading architecture config: {}", self.path.display()), e)
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConvertError::ConfigParsing {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let section = match value.get(size.to_string()) {
            Some(tier) => tier.clone(),
            None => value,
        };
        serde_json::from_value(section).map_err(|e| ConvertError::ConfigParsing {
            path: self.path.clone(),
            message: format!("architecture for size '{size}': {e}"),
        })
    }
}

/// In-memory architecture, identical for every size tier.
#[derive(Debug, Clone)]
pub struct StaticArchitecture(pub SourceConfig);

impl ArchitectureProvider for StaticArchitecture {
    fn architecture(&self, _size: ModelSize) -> Result<SourceConfig> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TINY: &str = r#"{
        "vocab_size": 50, "hidden_size": 8, "num_hidden_layers": 2,
        "num_attention_heads": 2, "intermediate_size": 32,
        "embedding_size": 6, "generator_hidden_size": 0.5
    }"#;

    #[test]
    fn test_presets_provider() {
        let cfg = ElectraPresets.architecture(ModelSize::Large).unwrap();
        assert_eq!(cfg.hidden_size, 1024);
    }

    #[test]
    fn test_json_single_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("electra.json");
        std::fs::write(&path, TINY).unwrap();
        let cfg = JsonArchitecture::new(&path)
            .architecture(ModelSize::Base)
            .unwrap();
        assert_eq!(cfg.hidden_size, 8);
        assert_eq!(cfg.embedding_size, 6);
    }

    #[test]
    fn test_json_keyed_by_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("electra.json");
        std::fs::write(&path, format!(r#"{{"small": {TINY}}}"#)).unwrap();
        let provider = JsonArchitecture::new(&path);
        assert_eq!(provider.architecture(ModelSize::Small).unwrap().vocab_size, 50);
        assert!(matches!(
            provider.architecture(ModelSize::Large),
            Err(ConvertError::ConfigParsing { .. })
        ));
    }

    #[test]
    fn test_json_missing_file() {
        let err = JsonArchitecture::new("/nonexistent/electra.json")
            .architecture(ModelSize::Small)
            .unwrap_err();
        assert_eq!(err.code(), "E050");
    }
}
