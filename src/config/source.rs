//! Source (BERT-style) hyperparameters and size tiers.

use serde::{Deserialize, Serialize};

/// ELECTRA size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    #[default]
    Small,
    Base,
    Large,
}

impl std::str::FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" => Ok(ModelSize::Small),
            "base" => Ok(ModelSize::Base),
            "large" => Ok(ModelSize::Large),
            _ => Err(format!(
                "Unknown model size: {s}. Valid sizes: small, base, large"
            )),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSize::Small => write!(f, "small"),
            ModelSize::Base => write!(f, "base"),
            ModelSize::Large => write!(f, "large"),
        }
    }
}

/// Hyperparameters of the source checkpoint.
///
/// Field names follow the BERT `config.json` convention, extended with the
/// ELECTRA pretraining fields for factorized embeddings and generator scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    #[serde(default = "default_dropout")]
    pub hidden_dropout_prob: f32,
    #[serde(default = "default_dropout")]
    pub attention_probs_dropout_prob: f32,
    #[serde(default = "default_max_positions")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab")]
    pub type_vocab_size: usize,
    #[serde(default = "default_initializer_range")]
    pub initializer_range: f32,
    /// Width of the token embeddings; equal to `hidden_size` when not factorized
    pub embedding_size: usize,
    /// Generator width as a fraction of the discriminator's
    pub generator_hidden_size: f32,
    /// Generator depth as a fraction of the discriminator's
    #[serde(default = "default_generator_layers")]
    pub generator_layers: f32,
}

fn default_hidden_act() -> String {
    "gelu".to_string()
}

fn default_dropout() -> f32 {
    0.1
}

fn default_max_positions() -> usize {
    512
}

fn default_type_vocab() -> usize {
    2
}

fn default_initializer_range() -> f32 {
    0.02
}

fn default_generator_layers() -> f32 {
    1.0
}

impl SourceConfig {
    /// Published configuration of a size tier.
    pub fn preset(size: ModelSize) -> Self {
        let (hidden, layers, embedding, generator_fraction) = match size {
            ModelSize::Small => (256, 12, 128, 0.25),
            ModelSize::Base => (768, 12, 768, 0.33333),
            ModelSize::Large => (1024, 24, 1024, 0.25),
        };
        Self {
            vocab_size: 30522,
            hidden_size: hidden,
            num_hidden_layers: layers,
            num_attention_heads: hidden / 64,
            intermediate_size: hidden * 4,
            hidden_act: default_hidden_act(),
            hidden_dropout_prob: default_dropout(),
            attention_probs_dropout_prob: default_dropout(),
            max_position_embeddings: default_max_positions(),
            type_vocab_size: default_type_vocab(),
            initializer_range: default_initializer_range(),
            embedding_size: embedding,
            generator_hidden_size: generator_fraction,
            generator_layers: default_generator_layers(),
        }
    }
}
