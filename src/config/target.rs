//! Target model configuration (`model.yml`).

use crate::error::{ConvertError, Result};
use crate::model::Activation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Architecture section of the target config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    /// Transformer width
    pub units: usize,
    /// Token embedding width
    pub embed_size: usize,
    /// Feed-forward inner width
    pub hidden_size: usize,
    pub max_length: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub pos_embed_type: String,
    pub activation: String,
    pub layer_norm_eps: f32,
    pub num_token_types: usize,
    pub hidden_dropout_prob: f32,
    pub attention_dropout_prob: f32,
    pub dtype: String,
    pub generator_layers_scale: f32,
    pub generator_units_scale: f32,
}

/// One initializer spec, e.g. `["truncnorm", 0.0, 0.02]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitArg {
    Number(f32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializerConfig {
    pub weight: Vec<InitArg>,
    pub bias: Vec<InitArg>,
}

/// Complete target configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "MODEL")]
    pub model: ModelConfig,
    #[serde(rename = "INITIALIZER")]
    pub initializer: InitializerConfig,
    #[serde(rename = "VERSION")]
    pub version: u32,
}

impl TargetConfig {
    /// Configuration of the generator: width, inner width and head count are
    /// scaled by `generator_units_scale`, depth by `generator_layers_scale`.
    #[must_use]
    pub fn generator(&self) -> Self {
        let scale = |value: usize, factor: f32| (value as f64 * f64::from(factor)).round() as usize;
        let mut cfg = self.clone();
        let units_scale = self.model.generator_units_scale;
        cfg.model.units = scale(self.model.units, units_scale);
        cfg.model.hidden_size = scale(self.model.hidden_size, units_scale);
        cfg.model.num_heads = scale(self.model.num_heads, units_scale);
        cfg.model.num_layers = scale(self.model.num_layers, self.model.generator_layers_scale);
        cfg
    }

    /// Whether embeddings are projected from `embed_size` to `units`.
    #[must_use]
    pub fn has_embed_projection(&self) -> bool {
        self.model.embed_size != self.model.units
    }

    pub fn activation(&self) -> Result<Activation> {
        self.model
            .activation
            .parse()
            .map_err(|message: String| ConvertError::ConfigValue {
                field: "MODEL.activation".into(),
                message,
                suggestion: "Use gelu, gelu(tanh), relu or tanh".into(),
            })
    }

    /// Reject configurations no model can be built from.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let sizes = [
            ("MODEL.vocab_size", m.vocab_size),
            ("MODEL.units", m.units),
            ("MODEL.embed_size", m.embed_size),
            ("MODEL.hidden_size", m.hidden_size),
            ("MODEL.max_length", m.max_length),
            ("MODEL.num_heads", m.num_heads),
            ("MODEL.num_layers", m.num_layers),
            ("MODEL.num_token_types", m.num_token_types),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(ConvertError::ConfigValue {
                    field: field.into(),
                    message: "must be positive".into(),
                    suggestion: "Check the source architecture for this size tier".into(),
                });
            }
        }

        if m.units % m.num_heads != 0 {
            return Err(ConvertError::ConfigValue {
                field: "MODEL.num_heads".into(),
                message: format!("units {} not divisible by {} heads", m.units, m.num_heads),
                suggestion: "Choose a head count that divides the hidden size".into(),
            });
        }

        for (field, p) in [
            ("MODEL.hidden_dropout_prob", m.hidden_dropout_prob),
            ("MODEL.attention_dropout_prob", m.attention_dropout_prob),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ConvertError::ConfigValue {
                    field: field.into(),
                    message: format!("dropout {p} outside [0, 1)"),
                    suggestion: "Use a probability such as 0.1".into(),
                });
            }
        }

        if m.layer_norm_eps.is_nan() || m.layer_norm_eps <= 0.0 {
            return Err(ConvertError::ConfigValue {
                field: "MODEL.layer_norm_eps".into(),
                message: format!("epsilon must be positive, got {}", m.layer_norm_eps),
                suggestion: "Use 1e-12".into(),
            });
        }

        self.activation()?;
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ConvertError::Serialization {
            message: format!("encoding model config: {e}"),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConvertError::io(format!("reading model config: {}", path.display()), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConvertError::ConfigParsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{translate, ModelSize, SourceConfig};

    fn small() -> TargetConfig {
        let source = SourceConfig::preset(ModelSize::Small);
        translate(&source, source.vocab_size).unwrap()
    }

    #[test]
    fn test_generator_scaling() {
        let gen = small().generator();
        assert_eq!(gen.model.units, 64);
        assert_eq!(gen.model.hidden_size, 256);
        assert_eq!(gen.model.num_heads, 1);
        assert_eq!(gen.model.num_layers, 12);
        assert_eq!(gen.model.embed_size, 128);
        assert_eq!(gen.model.vocab_size, 30522);
    }

    #[test]
    fn test_base_generator_rounds() {
        let source = SourceConfig::preset(ModelSize::Base);
        let gen = translate(&source, source.vocab_size).unwrap().generator();
        assert_eq!(gen.model.units, 256);
        assert_eq!(gen.model.hidden_size, 1024);
        assert_eq!(gen.model.num_heads, 4);
        assert!(gen.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_heads() {
        let mut cfg = small();
        cfg.model.num_heads = 3;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ConfigValue { ref field, .. } if field == "MODEL.num_heads"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_activation() {
        let mut cfg = small();
        cfg.model.activation = "swishy".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dropout_one() {
        let mut cfg = small();
        cfg.model.hidden_dropout_prob = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_yaml_sections() {
        let yaml = small().to_yaml().unwrap();
        assert!(yaml.contains("MODEL:"));
        assert!(yaml.contains("INITIALIZER:"));
        assert!(yaml.contains("VERSION: 1"));
        assert!(yaml.contains("truncnorm"));

        let back: TargetConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, small());
    }
}
