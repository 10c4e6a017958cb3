//! Source hyperparameters to target config.

use super::source::SourceConfig;
use super::target::{InitArg, InitializerConfig, ModelConfig, TargetConfig};
use crate::error::{ConvertError, Result};

/// Layer-norm epsilon of the target models.
pub const LAYER_NORM_EPS: f32 = 1e-12;

/// Translate source hyperparameters into a validated target config.
///
/// `vocab_size` is the tokenizer's vocabulary size; it must equal the size the
/// checkpoint was trained with. Precision, layer-norm epsilon, positional
/// embedding kind and initializer family have no source equivalent and are
/// set to fixed values.
pub fn translate(source: &SourceConfig, vocab_size: usize) -> Result<TargetConfig> {
    if vocab_size != source.vocab_size {
        return Err(ConvertError::ConfigMismatch {
            field: "vocab_size".into(),
            expected: source.vocab_size.to_string(),
            actual: vocab_size.to_string(),
        });
    }

    let cfg = TargetConfig {
        model: ModelConfig {
            vocab_size,
            units: source.hidden_size,
            embed_size: source.embedding_size,
            hidden_size: source.intermediate_size,
            max_length: source.max_position_embeddings,
            num_heads: source.num_attention_heads,
            num_layers: source.num_hidden_layers,
            pos_embed_type: "learned".into(),
            activation: source.hidden_act.clone(),
            layer_norm_eps: LAYER_NORM_EPS,
            num_token_types: source.type_vocab_size,
            hidden_dropout_prob: source.hidden_dropout_prob,
            attention_dropout_prob: source.attention_probs_dropout_prob,
            dtype: "float32".into(),
            generator_layers_scale: source.generator_layers,
            generator_units_scale: source.generator_hidden_size,
        },
        initializer: InitializerConfig {
            weight: vec![
                InitArg::Name("truncnorm".into()),
                InitArg::Number(0.0),
                InitArg::Number(source.initializer_range),
            ],
            bias: vec![InitArg::Name("zeros".into())],
        },
        version: 1,
    };
    cfg.validate()?;
    Ok(cfg)
}
