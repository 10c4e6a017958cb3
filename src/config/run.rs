//! Run configuration for a conversion, loadable from YAML.
//!
//! Every field has a CLI flag counterpart; flags override file values.

use super::source::ModelSize;
use crate::error::{ConvertError, Result};
use crate::mapping::ConversionRole;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete conversion run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Where the checkpoint comes from
    pub source: SourceSection,
    /// What gets written, and where
    #[serde(default)]
    pub output: OutputSection,
    /// Equivalence check settings
    #[serde(default)]
    pub check: CheckSection,
    /// Device placement for forward passes
    #[serde(default)]
    pub device: DeviceSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    /// Directory with `electra_<size>.safetensors` and the vocabulary file
    pub checkpoint_dir: PathBuf,
    #[serde(default)]
    pub model_size: ModelSize,
    /// Optional JSON architecture file replacing the built-in presets
    #[serde(default)]
    pub electra_config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    /// Defaults to `<checkpoint dir name>_converted`
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default = "default_roles")]
    pub roles: Vec<ConversionRole>,
    /// Rename outputs to `<stem>-<hash8>.<ext>`
    #[serde(default = "bool_true")]
    pub hash_names: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            save_dir: None,
            roles: default_roles(),
            hash_names: true,
        }
    }
}

fn default_roles() -> Vec<ConversionRole> {
    ConversionRole::ALL.to_vec()
}

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_seq_length")]
    pub seq_length: usize,
    #[serde(default = "default_num_mask")]
    pub num_mask: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_tolerance")]
    pub rtol: f32,
    #[serde(default = "default_tolerance")]
    pub atol: f32,
}

impl Default for CheckSection {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_batch_size(),
            seq_length: default_seq_length(),
            num_mask: default_num_mask(),
            seed: default_seed(),
            rtol: default_tolerance(),
            atol: default_tolerance(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_seq_length() -> usize {
    32
}

fn default_num_mask() -> usize {
    5
}

fn default_seed() -> u64 {
    1234
}

fn default_tolerance() -> f32 {
    1e-3
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Accelerator index; CPU when unset
    #[serde(default)]
    pub gpu: Option<usize>,
}

impl ConvertConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::io(format!("reading config file: {}", path.display()), e))?;

        Self::from_yaml(&content, path)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ConvertError::ConfigParsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Minimal configuration with every default applied.
    pub fn minimal(checkpoint_dir: impl Into<PathBuf>, model_size: ModelSize) -> Self {
        Self {
            source: SourceSection {
                checkpoint_dir: checkpoint_dir.into(),
                model_size,
                electra_config: None,
            },
            output: OutputSection::default(),
            check: CheckSection::default(),
            device: DeviceSection::default(),
        }
    }

    /// Output directory, falling back to `<basename>_converted`.
    #[must_use]
    pub fn save_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output.save_dir {
            return dir.clone();
        }
        let base = self
            .source
            .checkpoint_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "electra".to_string());
        PathBuf::from(format!("{base}_converted"))
    }

    /// Whether a role is part of this run.
    #[must_use]
    pub fn converts(&self, role: ConversionRole) -> bool {
        self.output.roles.contains(&role)
    }
}

/// Checks a run configuration before any work starts.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Returns `Ok(())` if valid, or an error with an actionable suggestion.
    pub fn validate(config: &ConvertConfig) -> Result<()> {
        Self::validate_source(&config.source)?;
        Self::validate_output(&config.output)?;
        Self::validate_check(&config.check)?;
        Ok(())
    }

    fn validate_source(source: &SourceSection) -> Result<()> {
        if source.checkpoint_dir.as_os_str().is_empty() {
            return Err(ConvertError::ConfigValue {
                field: "source.checkpoint_dir".into(),
                message: "Checkpoint directory cannot be empty".into(),
                suggestion: "Point at the directory holding electra_<size>.safetensors".into(),
            });
        }
        Ok(())
    }

    fn validate_output(output: &OutputSection) -> Result<()> {
        if output.roles.is_empty() {
            return Err(ConvertError::ConfigValue {
                field: "output.roles".into(),
                message: "At least one role must be converted".into(),
                suggestion: "Use [backbone, disc, gen]".into(),
            });
        }

        let mut seen = output.roles.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != output.roles.len() {
            return Err(ConvertError::ConfigValue {
                field: "output.roles".into(),
                message: format!("Duplicate roles in {:?}", output.roles),
                suggestion: "List each role once".into(),
            });
        }

        if output.roles.contains(&ConversionRole::Generator)
            && !output.roles.contains(&ConversionRole::Discriminator)
        {
            return Err(ConvertError::ConfigValue {
                field: "output.roles".into(),
                message: "The generator shares its embeddings with the discriminator".into(),
                suggestion: "Add disc to the roles when converting gen".into(),
            });
        }
        Ok(())
    }

    fn validate_check(check: &CheckSection) -> Result<()> {
        if check.batch_size == 0 {
            return Err(ConvertError::ConfigValue {
                field: "check.batch_size".into(),
                message: "Batch size must be positive".into(),
                suggestion: "Use batch size 3".into(),
            });
        }

        if check.seq_length < 2 {
            return Err(ConvertError::ConfigValue {
                field: "check.seq_length".into(),
                message: format!("Sequence length too short: {}", check.seq_length),
                suggestion: "Use a sequence length of at least 2 (32 recommended)".into(),
            });
        }

        if check.num_mask == 0 {
            return Err(ConvertError::ConfigValue {
                field: "check.num_mask".into(),
                message: "Number of masked positions must be positive".into(),
                suggestion: "Use 5 masked positions".into(),
            });
        }

        for (field, tol) in [("check.rtol", check.rtol), ("check.atol", check.atol)] {
            if !tol.is_finite() || tol < 0.0 {
                return Err(ConvertError::ConfigValue {
                    field: field.into(),
                    message: format!("Tolerance must be finite and non-negative, got {tol}"),
                    suggestion: "Use 1e-3".into(),
                });
            }
        }
        Ok(())
    }
}
