//! ELECTRA target models: backbone, discriminator and generator.
//!
//! Parameters are declared at construction with their final shapes and zero
//! contents; conversion fills them in place through [`TargetModel::named_parameters`].

use super::inputs::{ForwardOutput, InputBatch};
use super::ops::{self, Activation};
use super::params::{extend_prefixed, new_slot, slot, ParamDict};
use crate::config::TargetConfig;
use crate::error::{ConvertError, Result};
use crate::mapping::BACKBONE_PREFIX;
use ndarray::{s, Array1, Array2, Array3, Axis};
use std::rc::Rc;

/// Scope of the encoder layers inside a backbone.
pub const LAYER_SCOPE: &str = "encoder.all_encoder_layers";

/// Backbone embedding parameters the generator shares with the discriminator.
pub const TIED_EMBEDDING_PARAMS: &[&str] = &[
    "word_embed.weight",
    "token_type_embed.weight",
    "token_pos_embed._embed.weight",
    "embed_layer_norm.gamma",
    "embed_layer_norm.beta",
];

/// Generator output projection, tied to its own word embedding.
pub const MLM_OUTPUT_WEIGHT: &str = "mlm_decoder.3.weight";

/// Capability interface the converter needs from a target model.
pub trait TargetModel {
    /// Every parameter slot by full name. Tied names share one slot.
    fn named_parameters(&self) -> ParamDict;

    fn forward(&self, inputs: &InputBatch) -> Result<ForwardOutput>;

    /// Backbone configuration.
    fn config(&self) -> &TargetConfig;

    /// Prefix of the backbone's names inside this model.
    fn backbone_prefix(&self) -> &'static str;

    fn num_layers(&self) -> usize {
        self.config().model.num_layers
    }
}

/// `encoder.all_encoder_layers.{layer}`
#[must_use]
pub fn layer_prefix(layer: usize) -> String {
    format!("{LAYER_SCOPE}.{layer}")
}

fn matrix(params: &ParamDict, name: &str) -> Result<Array2<f32>> {
    ops::as_matrix(name, &slot(params, name)?.borrow())
}

fn vector(params: &ParamDict, name: &str) -> Result<Array1<f32>> {
    ops::as_vector(name, &slot(params, name)?.borrow())
}

fn dense_layer(params: &ParamDict, scope: &str, x: &Array2<f32>) -> Result<Array2<f32>> {
    let weight = matrix(params, &format!("{scope}.weight"))?;
    let bias = vector(params, &format!("{scope}.bias"))?;
    Ok(ops::dense(x, &weight, &bias))
}

fn norm_layer(params: &ParamDict, scope: &str, x: &Array2<f32>, eps: f32) -> Result<Array2<f32>> {
    let gamma = vector(params, &format!("{scope}.gamma"))?;
    let beta = vector(params, &format!("{scope}.beta"))?;
    Ok(ops::layer_norm(x, &gamma, &beta, eps))
}

fn declare(params: &mut ParamDict, name: impl Into<String>, shape: &[usize]) {
    params.insert(name.into(), new_slot(shape));
}

fn declare_dense(params: &mut ParamDict, scope: &str, out_units: usize, in_units: usize) {
    declare(params, format!("{scope}.weight"), &[out_units, in_units]);
    declare(params, format!("{scope}.bias"), &[out_units]);
}

fn declare_norm(params: &mut ParamDict, scope: &str, units: usize) {
    declare(params, format!("{scope}.gamma"), &[units]);
    declare(params, format!("{scope}.beta"), &[units]);
}

/// Shared trunk: embeddings, optional factorized projection, post-norm encoder.
#[derive(Debug, Clone)]
pub struct ElectraModel {
    config: TargetConfig,
    activation: Activation,
    params: ParamDict,
}

impl ElectraModel {
    pub fn new(config: &TargetConfig) -> Result<Self> {
        config.validate()?;
        let m = &config.model;
        let mut params = ParamDict::new();

        declare(&mut params, "word_embed.weight", &[m.vocab_size, m.embed_size]);
        declare(&mut params, "token_type_embed.weight", &[m.num_token_types, m.embed_size]);
        declare(&mut params, "token_pos_embed._embed.weight", &[m.max_length, m.embed_size]);
        declare_norm(&mut params, "embed_layer_norm", m.embed_size);
        if config.has_embed_projection() {
            declare_dense(&mut params, "embed_factorized_proj", m.units, m.embed_size);
        }

        for layer in 0..m.num_layers {
            let p = layer_prefix(layer);
            declare_dense(&mut params, &format!("{p}.attn_qkv"), 3 * m.units, m.units);
            declare_dense(&mut params, &format!("{p}.attention_proj"), m.units, m.units);
            declare_norm(&mut params, &format!("{p}.layer_norm"), m.units);
            declare_dense(&mut params, &format!("{p}.ffn.ffn_1"), m.hidden_size, m.units);
            declare_dense(&mut params, &format!("{p}.ffn.ffn_2"), m.units, m.hidden_size);
            declare_norm(&mut params, &format!("{p}.ffn.layer_norm"), m.units);
        }

        Ok(Self {
            config: config.clone(),
            activation: config.activation()?,
            params,
        })
    }

    /// Parameters without any prefix.
    #[must_use]
    pub fn params(&self) -> &ParamDict {
        &self.params
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn embed(&self, inputs: &InputBatch, b: usize) -> Result<Array2<f32>> {
        let ids: Vec<usize> = inputs.token_ids.row(b).to_vec();
        let types: Vec<usize> = inputs.token_types.row(b).to_vec();
        let positions: Vec<usize> = (0..inputs.seq_len()).collect();

        let word = matrix(&self.params, "word_embed.weight")?;
        let token_type = matrix(&self.params, "token_type_embed.weight")?;
        let position = matrix(&self.params, "token_pos_embed._embed.weight")?;

        let x = ops::gather_rows("word_embed.weight", &word, &ids)?
            + ops::gather_rows("token_type_embed.weight", &token_type, &types)?
            + ops::gather_rows("token_pos_embed._embed.weight", &position, &positions)?;
        let x = norm_layer(&self.params, "embed_layer_norm", &x, self.config.model.layer_norm_eps)?;

        if self.config.has_embed_projection() {
            dense_layer(&self.params, "embed_factorized_proj", &x)
        } else {
            Ok(x)
        }
    }

    fn encoder_layer(&self, layer: usize, x: Array2<f32>, valid: usize) -> Result<Array2<f32>> {
        let p = layer_prefix(layer);
        let units = self.config.model.units;
        let eps = self.config.model.layer_norm_eps;

        let qkv = dense_layer(&self.params, &format!("{p}.attn_qkv"), &x)?;
        let q = qkv.slice(s![.., ..units]).to_owned();
        let k = qkv.slice(s![.., units..2 * units]).to_owned();
        let v = qkv.slice(s![.., 2 * units..]).to_owned();
        let context = ops::multi_head_attention(&q, &k, &v, self.config.model.num_heads, |scores| {
            ops::masked_softmax(scores, valid)
        });

        let attended = dense_layer(&self.params, &format!("{p}.attention_proj"), &context)?;
        let x = norm_layer(&self.params, &format!("{p}.layer_norm"), &(x + &attended), eps)?;

        let mut hidden = dense_layer(&self.params, &format!("{p}.ffn.ffn_1"), &x)?;
        self.activation.apply_inplace(&mut hidden);
        let out = dense_layer(&self.params, &format!("{p}.ffn.ffn_2"), &hidden)?;
        norm_layer(&self.params, &format!("{p}.ffn.layer_norm"), &(x + &out), eps)
    }

    /// Contextual embeddings `[batch, seq, units]` and pooled output `[batch, units]`.
    pub fn encode(&self, inputs: &InputBatch) -> Result<(Array3<f32>, Array2<f32>)> {
        let m = &self.config.model;
        inputs.validate(m.vocab_size, m.num_token_types, m.max_length)?;

        let (batch, seq) = (inputs.batch_size(), inputs.seq_len());
        let mut contextual = Array3::<f32>::zeros((batch, seq, m.units));
        for b in 0..batch {
            let mut x = self.embed(inputs, b)?;
            for layer in 0..m.num_layers {
                x = self.encoder_layer(layer, x, inputs.valid_length[b])?;
            }
            contextual.slice_mut(s![b, .., ..]).assign(&x);
        }
        let pooled = contextual.index_axis(Axis(1), 0).to_owned();
        Ok((contextual, pooled))
    }
}

impl TargetModel for ElectraModel {
    fn named_parameters(&self) -> ParamDict {
        self.params.clone()
    }

    fn forward(&self, inputs: &InputBatch) -> Result<ForwardOutput> {
        let (contextual, pooled) = self.encode(inputs)?;
        Ok(ForwardOutput {
            contextual,
            pooled,
            scores: None,
        })
    }

    fn config(&self) -> &TargetConfig {
        &self.config
    }

    fn backbone_prefix(&self) -> &'static str {
        ""
    }
}

/// Backbone plus the replaced-token-detection head.
#[derive(Debug, Clone)]
pub struct ElectraDiscriminator {
    backbone: ElectraModel,
    head: ParamDict,
}

impl ElectraDiscriminator {
    pub fn new(config: &TargetConfig) -> Result<Self> {
        let backbone = ElectraModel::new(config)?;
        let units = config.model.units;
        let mut head = ParamDict::new();
        declare_dense(&mut head, "rtd_encoder.0", units, units);
        declare_dense(&mut head, "rtd_encoder.2", 1, units);
        Ok(Self { backbone, head })
    }

    #[must_use]
    pub fn backbone(&self) -> &ElectraModel {
        &self.backbone
    }
}

impl TargetModel for ElectraDiscriminator {
    fn named_parameters(&self) -> ParamDict {
        let mut all = self.head.clone();
        extend_prefixed(&mut all, BACKBONE_PREFIX, &self.backbone.params);
        all
    }

    fn forward(&self, inputs: &InputBatch) -> Result<ForwardOutput> {
        let (contextual, pooled) = self.backbone.encode(inputs)?;
        let (batch, seq, units) = contextual.dim();
        let flat = contextual
            .to_shape((batch * seq, units))
            .map_err(|e| ConvertError::InvalidInput {
                message: format!("reshaping contextual output: {e}"),
            })?
            .to_owned();

        let mut hidden = dense_layer(&self.head, "rtd_encoder.0", &flat)?;
        self.backbone.activation.apply_inplace(&mut hidden);
        let logits = dense_layer(&self.head, "rtd_encoder.2", &hidden)?;
        let scores = logits
            .into_shape_with_order((batch, seq))
            .map_err(|e| ConvertError::InvalidInput {
                message: format!("reshaping detection scores: {e}"),
            })?
            .into_dyn();

        Ok(ForwardOutput {
            contextual,
            pooled,
            scores: Some(scores),
        })
    }

    fn config(&self) -> &TargetConfig {
        &self.backbone.config
    }

    fn backbone_prefix(&self) -> &'static str {
        BACKBONE_PREFIX
    }
}

/// Narrower backbone plus the masked-LM head.
#[derive(Debug, Clone)]
pub struct ElectraGenerator {
    backbone: ElectraModel,
    head: ParamDict,
}

impl ElectraGenerator {
    /// `config` is the generator's own (already scaled) configuration.
    pub fn new(config: &TargetConfig) -> Result<Self> {
        let backbone = ElectraModel::new(config)?;
        let m = &config.model;
        let mut head = ParamDict::new();
        declare_dense(&mut head, "mlm_decoder.0", m.embed_size, m.units);
        declare_norm(&mut head, "mlm_decoder.2", m.embed_size);
        declare(&mut head, "mlm_decoder.3.bias", &[m.vocab_size]);
        let word_embed = Rc::clone(slot(&backbone.params, "word_embed.weight")?);
        head.insert(MLM_OUTPUT_WEIGHT.to_string(), word_embed);
        Ok(Self { backbone, head })
    }

    /// Share the embedding slots of `source` (the discriminator's backbone).
    ///
    /// The output projection follows the word embedding, so it ends up
    /// sharing the discriminator's slot as well.
    pub fn tie_embeddings(&mut self, source: &ElectraModel) -> Result<()> {
        for name in TIED_EMBEDDING_PARAMS {
            let theirs = slot(&source.params, name)?;
            let ours = slot(&self.backbone.params, name)?;
            let expected = ours.borrow().shape().to_vec();
            let actual = theirs.borrow().shape().to_vec();
            if expected != actual {
                return Err(ConvertError::ShapeMismatch {
                    name: format!("{BACKBONE_PREFIX}{name}"),
                    expected,
                    actual,
                });
            }
            self.backbone.params.insert((*name).to_string(), Rc::clone(theirs));
        }
        let word_embed = Rc::clone(slot(&self.backbone.params, "word_embed.weight")?);
        self.head.insert(MLM_OUTPUT_WEIGHT.to_string(), word_embed);
        Ok(())
    }

    #[must_use]
    pub fn backbone(&self) -> &ElectraModel {
        &self.backbone
    }
}

impl TargetModel for ElectraGenerator {
    fn named_parameters(&self) -> ParamDict {
        let mut all = self.head.clone();
        extend_prefixed(&mut all, BACKBONE_PREFIX, &self.backbone.params);
        all
    }

    fn forward(&self, inputs: &InputBatch) -> Result<ForwardOutput> {
        let (contextual, pooled) = self.backbone.encode(inputs)?;
        let m = &self.backbone.config.model;
        let num_mask = inputs.masked_positions.ncols();
        let mut scores = Array3::<f32>::zeros((inputs.batch_size(), num_mask, m.vocab_size));
        let output_weight = matrix(&self.head, MLM_OUTPUT_WEIGHT)?;
        let output_bias = vector(&self.head, "mlm_decoder.3.bias")?;

        for b in 0..inputs.batch_size() {
            let positions: Vec<usize> = inputs.masked_positions.row(b).to_vec();
            let picked = contextual.index_axis(Axis(0), b).select(Axis(0), &positions);
            let mut hidden = dense_layer(&self.head, "mlm_decoder.0", &picked)?;
            self.backbone.activation.apply_inplace(&mut hidden);
            let hidden = norm_layer(&self.head, "mlm_decoder.2", &hidden, m.layer_norm_eps)?;
            let logits = ops::dense(&hidden, &output_weight, &output_bias);
            scores.slice_mut(s![b, .., ..]).assign(&logits);
        }

        Ok(ForwardOutput {
            contextual,
            pooled,
            scores: Some(scores.into_dyn()),
        })
    }

    fn config(&self) -> &TargetConfig {
        &self.backbone.config
    }

    fn backbone_prefix(&self) -> &'static str {
        BACKBONE_PREFIX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{translate, SourceConfig};
    use crate::fixtures::tiny_source_config;

    fn tiny() -> TargetConfig {
        let source: SourceConfig = tiny_source_config();
        translate(&source, source.vocab_size).unwrap()
    }

    #[test]
    fn test_backbone_parameter_names_and_shapes() {
        let model = ElectraModel::new(&tiny()).unwrap();
        let params = model.named_parameters();
        // 7 embedding-side tensors plus 12 per layer
        assert_eq!(params.len(), 7 + 2 * 12);
        assert_eq!(params["word_embed.weight"].borrow().shape(), &[50, 6]);
        assert_eq!(params["embed_factorized_proj.weight"].borrow().shape(), &[8, 6]);
        assert_eq!(
            params["encoder.all_encoder_layers.1.attn_qkv.weight"].borrow().shape(),
            &[24, 8]
        );
        assert_eq!(
            params["encoder.all_encoder_layers.0.ffn.ffn_1.weight"].borrow().shape(),
            &[32, 8]
        );
    }

    #[test]
    fn test_no_projection_when_widths_match() {
        let mut cfg = tiny();
        cfg.model.embed_size = cfg.model.units;
        let model = ElectraModel::new(&cfg).unwrap();
        assert!(!model.params().contains_key("embed_factorized_proj.weight"));
    }

    #[test]
    fn test_discriminator_names() {
        let disc = ElectraDiscriminator::new(&tiny()).unwrap();
        let params = disc.named_parameters();
        assert!(params.contains_key("backbone_model.word_embed.weight"));
        assert_eq!(params["rtd_encoder.2.weight"].borrow().shape(), &[1, 8]);
        assert!(params
            .keys()
            .all(|k| k.starts_with("backbone_model.") || k.starts_with("rtd_encoder.")));
    }

    #[test]
    fn test_generator_ties_output_to_word_embedding() {
        let gen = ElectraGenerator::new(&tiny().generator()).unwrap();
        let params = gen.named_parameters();
        assert!(Rc::ptr_eq(
            &params[MLM_OUTPUT_WEIGHT],
            &params["backbone_model.word_embed.weight"]
        ));
        assert_eq!(params["mlm_decoder.0.weight"].borrow().shape(), &[6, 4]);
    }

    #[test]
    fn test_tie_embeddings_shares_discriminator_slots() {
        let cfg = tiny();
        let disc = ElectraDiscriminator::new(&cfg).unwrap();
        let mut gen = ElectraGenerator::new(&cfg.generator()).unwrap();
        gen.tie_embeddings(disc.backbone()).unwrap();

        let d = disc.named_parameters();
        let g = gen.named_parameters();
        for name in TIED_EMBEDDING_PARAMS {
            let full = format!("backbone_model.{name}");
            assert!(Rc::ptr_eq(&d[&full], &g[&full]), "{full} not shared");
        }
        assert!(Rc::ptr_eq(&g[MLM_OUTPUT_WEIGHT], &d["backbone_model.word_embed.weight"]));
    }

    #[test]
    fn test_tie_embeddings_rejects_mismatched_vocab() {
        let cfg = tiny();
        let mut other = cfg.clone();
        other.model.vocab_size = 60;
        let disc = ElectraDiscriminator::new(&other).unwrap();
        let mut gen = ElectraGenerator::new(&cfg.generator()).unwrap();
        let err = gen.tie_embeddings(disc.backbone()).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_forward_shapes() {
        let cfg = tiny();
        let inputs = InputBatch::random(50, 2, 2, 8, 3, 3).unwrap();

        let out = ElectraModel::new(&cfg).unwrap().forward(&inputs).unwrap();
        assert_eq!(out.contextual.dim(), (2, 8, 8));
        assert_eq!(out.pooled.dim(), (2, 8));
        assert!(out.contextual.iter().all(|v| v.is_finite()));

        let disc = ElectraDiscriminator::new(&cfg).unwrap();
        let scores = disc.forward(&inputs).unwrap().scores.unwrap();
        assert_eq!(scores.shape(), &[2, 8]);

        let gen = ElectraGenerator::new(&cfg.generator()).unwrap();
        let out = gen.forward(&inputs).unwrap();
        assert_eq!(out.contextual.dim(), (2, 8, 4));
        assert_eq!(out.scores.unwrap().shape(), &[2, 3, 50]);
    }

    #[test]
    fn test_forward_rejects_bad_token() {
        let model = ElectraModel::new(&tiny()).unwrap();
        let mut inputs = InputBatch::random(50, 2, 1, 4, 1, 0).unwrap();
        inputs.token_ids[[0, 0]] = 50;
        assert!(matches!(
            model.forward(&inputs),
            Err(ConvertError::InvalidInput { .. })
        ));
    }
}
