//! Reference forward pass over source-named tensors.
//!
//! Follows the TF BERT encoder used by ELECTRA: kernels stored `[in, out]`,
//! separate query/key/value projections, an additive `-10000` key mask, the
//! tanh GELU approximation, and the first position as pooled output.

use crate::checkpoint::Checkpoint;
use crate::config::{SourceConfig, LAYER_NORM_EPS};
use crate::error::{ConvertError, Result};
use crate::model::ops::{self, Activation};
use crate::model::{ForwardOutput, InputBatch};
use ndarray::{s, Array1, Array2, Array3, Axis};

/// Source-side ELECTRA encoder reading tensors straight from a checkpoint.
pub struct TfElectraReference<'a> {
    checkpoint: &'a Checkpoint,
    config: &'a SourceConfig,
    scope: &'static str,
    activation: Activation,
}

impl<'a> TfElectraReference<'a> {
    /// Reference over the discriminator encoder (`electra/...`).
    pub fn new(checkpoint: &'a Checkpoint, config: &'a SourceConfig) -> Result<Self> {
        let activation = Activation::from_tf_name(&config.hidden_act).map_err(|message| {
            ConvertError::ConfigValue {
                field: "hidden_act".into(),
                message,
                suggestion: "Use gelu, relu or tanh".into(),
            }
        })?;
        Ok(Self {
            checkpoint,
            config,
            scope: "electra",
            activation,
        })
    }

    fn matrix(&self, name: &str) -> Result<Array2<f32>> {
        let full = format!("{}/{name}", self.scope);
        ops::as_matrix(&full, self.checkpoint.get(&full)?)
    }

    fn vector(&self, name: &str) -> Result<Array1<f32>> {
        let full = format!("{}/{name}", self.scope);
        ops::as_vector(&full, self.checkpoint.get(&full)?)
    }

    fn dense(&self, scope: &str, x: &Array2<f32>) -> Result<Array2<f32>> {
        let kernel = self.matrix(&format!("{scope}/kernel"))?;
        let bias = self.vector(&format!("{scope}/bias"))?;
        Ok(ops::affine(x, &kernel, &bias))
    }

    fn norm(&self, scope: &str, x: &Array2<f32>) -> Result<Array2<f32>> {
        let gamma = self.vector(&format!("{scope}/gamma"))?;
        let beta = self.vector(&format!("{scope}/beta"))?;
        Ok(ops::layer_norm(x, &gamma, &beta, LAYER_NORM_EPS))
    }

    fn embed(&self, inputs: &InputBatch, b: usize) -> Result<Array2<f32>> {
        let ids: Vec<usize> = inputs.token_ids.row(b).to_vec();
        let types: Vec<usize> = inputs.token_types.row(b).to_vec();
        let positions: Vec<usize> = (0..inputs.seq_len()).collect();

        let word = self.matrix("embeddings/word_embeddings")?;
        let x = ops::gather_rows("word_embeddings", &word, &ids)?
            + ops::gather_rows(
                "token_type_embeddings",
                &self.matrix("embeddings/token_type_embeddings")?,
                &types,
            )?
            + ops::gather_rows(
                "position_embeddings",
                &self.matrix("embeddings/position_embeddings")?,
                &positions,
            )?;
        let x = self.norm("embeddings/LayerNorm", &x)?;

        if self
            .checkpoint
            .contains(&format!("{}/embeddings_project/kernel", self.scope))
        {
            self.dense("embeddings_project", &x)
        } else {
            Ok(x)
        }
    }

    fn layer(&self, layer: usize, x: Array2<f32>, valid: usize) -> Result<Array2<f32>> {
        let p = format!("encoder/layer_{layer}");
        let q = self.dense(&format!("{p}/attention/self/query"), &x)?;
        let k = self.dense(&format!("{p}/attention/self/key"), &x)?;
        let v = self.dense(&format!("{p}/attention/self/value"), &x)?;
        let heads = self.config.num_attention_heads;
        let context = ops::multi_head_attention(&q, &k, &v, heads, |scores| {
            ops::additive_masked_softmax(scores, valid)
        });

        let attended = self.dense(&format!("{p}/attention/output/dense"), &context)?;
        let x = self.norm(&format!("{p}/attention/output/LayerNorm"), &(x + &attended))?;

        let mut hidden = self.dense(&format!("{p}/intermediate/dense"), &x)?;
        self.activation.apply_inplace(&mut hidden);
        let out = self.dense(&format!("{p}/output/dense"), &hidden)?;
        self.norm(&format!("{p}/output/LayerNorm"), &(x + &out))
    }

    /// Sequence output and first-position pooled output.
    pub fn forward(&self, inputs: &InputBatch) -> Result<ForwardOutput> {
        inputs.validate(
            self.config.vocab_size,
            self.config.type_vocab_size,
            self.config.max_position_embeddings,
        )?;

        let (batch, seq) = (inputs.batch_size(), inputs.seq_len());
        let mut contextual = Array3::<f32>::zeros((batch, seq, self.config.hidden_size));
        for b in 0..batch {
            let mut x = self.embed(inputs, b)?;
            for layer in 0..self.config.num_hidden_layers {
                x = self.layer(layer, x, inputs.valid_length[b])?;
            }
            if x.ncols() != self.config.hidden_size {
                return Err(ConvertError::ShapeMismatch {
                    name: format!("{}/encoder output", self.scope),
                    expected: vec![seq, self.config.hidden_size],
                    actual: x.shape().to_vec(),
                });
            }
            contextual.slice_mut(s![b, .., ..]).assign(&x);
        }
        let pooled = contextual.index_axis(Axis(1), 0).to_owned();
        Ok(ForwardOutput {
            contextual,
            pooled,
            scores: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{synthetic_checkpoint, tiny_source_config};

    #[test]
    fn test_reference_forward_shapes() {
        let config = tiny_source_config();
        let ckpt = synthetic_checkpoint(&config, 11);
        let reference = TfElectraReference::new(&ckpt, &config).unwrap();
        let inputs = InputBatch::random(50, 2, 2, 8, 2, 5).unwrap();
        let out = reference.forward(&inputs).unwrap();
        assert_eq!(out.contextual.dim(), (2, 8, 8));
        assert_eq!(out.pooled.dim(), (2, 8));
        assert!(out.contextual.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reference_missing_tensor() {
        let config = tiny_source_config();
        let ckpt = Checkpoint::from_tensors(Vec::new());
        let reference = TfElectraReference::new(&ckpt, &config).unwrap();
        let inputs = InputBatch::random(50, 2, 1, 4, 1, 5).unwrap();
        assert!(matches!(
            reference.forward(&inputs),
            Err(ConvertError::CheckpointRead { .. })
        ));
    }

    #[test]
    fn test_unknown_activation() {
        let mut config = tiny_source_config();
        config.hidden_act = "softsign".into();
        let ckpt = Checkpoint::from_tensors(Vec::new());
        assert!(TfElectraReference::new(&ckpt, &config).is_err());
    }
}
