//! Synthetic ELECTRA checkpoints for tests.
//!
//! Compiled for unit tests and behind the `fixtures` feature.
//!
//! Tensors follow the TF variable layout of a pretraining checkpoint,
//! including optimizer slots and scalar counters that the reader filters out.
//! Values are drawn from an explicitly seeded generator.

use crate::checkpoint::{index_file_name, Checkpoint, SPECIAL_TOKENS};
use crate::config::{ModelSize, SourceConfig};
use crate::error::{ConvertError, Result};
use crate::tensor::to_le_bytes;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Two-layer, width-8 architecture with factorized embeddings and a half-width generator.
#[must_use]
pub fn tiny_source_config() -> SourceConfig {
    SourceConfig {
        vocab_size: 50,
        hidden_size: 8,
        num_hidden_layers: 2,
        num_attention_heads: 2,
        intermediate_size: 32,
        hidden_act: "gelu".into(),
        hidden_dropout_prob: 0.1,
        attention_probs_dropout_prob: 0.1,
        max_position_embeddings: 32,
        type_vocab_size: 2,
        initializer_range: 0.02,
        embedding_size: 6,
        generator_hidden_size: 0.5,
        generator_layers: 1.0,
    }
}

struct Sampler {
    rng: StdRng,
    tensors: Vec<(String, ArrayD<f32>)>,
}

impl Sampler {
    fn uniform(&mut self, name: String, shape: &[usize], center: f32, spread: f32) {
        let rng = &mut self.rng;
        let tensor = ArrayD::from_shape_simple_fn(IxDyn(shape), || {
            center + rng.random_range(-spread..spread)
        });
        self.tensors.push((name, tensor));
    }

    fn weight(&mut self, name: String, shape: &[usize]) {
        self.uniform(name, shape, 0.0, 0.2);
    }

    fn dense(&mut self, scope: &str, in_units: usize, out_units: usize) {
        self.weight(format!("{scope}/kernel"), &[in_units, out_units]);
        self.uniform(format!("{scope}/bias"), &[out_units], 0.0, 0.05);
    }

    fn norm(&mut self, scope: &str, units: usize) {
        self.uniform(format!("{scope}/gamma"), &[units], 1.0, 0.1);
        self.uniform(format!("{scope}/beta"), &[units], 0.0, 0.05);
    }

    fn encoder(&mut self, scope: &str, layers: usize, units: usize, inner: usize) {
        for layer in 0..layers {
            let p = format!("{scope}/encoder/layer_{layer}");
            for proj in ["query", "key", "value"] {
                self.dense(&format!("{p}/attention/self/{proj}"), units, units);
            }
            self.dense(&format!("{p}/attention/output/dense"), units, units);
            self.norm(&format!("{p}/attention/output/LayerNorm"), units);
            self.dense(&format!("{p}/intermediate/dense"), units, inner);
            self.dense(&format!("{p}/output/dense"), inner, units);
            self.norm(&format!("{p}/output/LayerNorm"), units);
        }
    }
}

fn scaled(value: usize, factor: f32) -> usize {
    (value as f64 * f64::from(factor)).round() as usize
}

/// Every variable of a pretraining checkpoint for `config`, filtered ones included.
#[must_use]
pub fn synthetic_tensors(config: &SourceConfig, seed: u64) -> Vec<(String, ArrayD<f32>)> {
    let mut s = Sampler {
        rng: StdRng::seed_from_u64(seed),
        tensors: Vec::new(),
    };
    let (h, e, v) = (config.hidden_size, config.embedding_size, config.vocab_size);

    s.uniform("electra/embeddings/word_embeddings".into(), &[v, e], 0.0, 0.5);
    s.uniform(
        "electra/embeddings/token_type_embeddings".into(),
        &[config.type_vocab_size, e],
        0.0,
        0.5,
    );
    s.uniform(
        "electra/embeddings/position_embeddings".into(),
        &[config.max_position_embeddings, e],
        0.0,
        0.5,
    );
    s.norm("electra/embeddings/LayerNorm", e);
    if e != h {
        s.dense("electra/embeddings_project", e, h);
    }
    s.encoder("electra", config.num_hidden_layers, h, config.intermediate_size);
    s.dense("discriminator_predictions/dense", h, h);
    s.dense("discriminator_predictions/dense_1", h, 1);

    let gen_units = scaled(h, config.generator_hidden_size);
    let gen_inner = scaled(config.intermediate_size, config.generator_hidden_size);
    let gen_layers = scaled(config.num_hidden_layers, config.generator_layers);
    if e != gen_units {
        s.dense("generator/embeddings_project", e, gen_units);
    }
    s.encoder("generator", gen_layers, gen_units, gen_inner);
    s.dense("generator_predictions/dense", gen_units, e);
    s.norm("generator_predictions/LayerNorm", e);
    s.uniform("generator_predictions/output_bias".into(), &[v], 0.0, 0.05);

    let optimizer_slots: Vec<(String, ArrayD<f32>)> = s
        .tensors
        .iter()
        .take(2)
        .flat_map(|(name, t)| {
            [
                (format!("{name}/adam_m"), t.clone()),
                (format!("{name}/adam_v"), t.clone()),
            ]
        })
        .collect();
    s.tensors.extend(optimizer_slots);
    s.tensors.push((
        "generator_predictions/temperature".into(),
        ArrayD::from_elem(IxDyn(&[]), 1.0),
    ));
    s.tensors
}

/// In-memory checkpoint for `config`.
#[must_use]
pub fn synthetic_checkpoint(config: &SourceConfig, seed: u64) -> Checkpoint {
    Checkpoint::from_tensors(synthetic_tensors(config, seed))
}

/// Write tensors as an F32 SafeTensors index, plus an I64 `global_step`.
pub fn write_checkpoint(path: impl AsRef<Path>, tensors: &[(String, ArrayD<f32>)]) -> Result<()> {
    let path = path.as_ref();
    let buffers: Vec<(&str, Vec<u8>, Vec<usize>)> = tensors
        .iter()
        .map(|(name, t)| (name.as_str(), to_le_bytes(t), t.shape().to_vec()))
        .collect();
    let step = 1_000_000_i64.to_le_bytes();

    let serialization = |e: safetensors::SafeTensorError| ConvertError::Serialization {
        message: format!("encoding checkpoint {}: {e}", path.display()),
    };
    let mut views = Vec::with_capacity(buffers.len() + 1);
    for (name, bytes, shape) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(serialization)?;
        views.push((*name, view));
    }
    let global_step = TensorView::new(Dtype::I64, vec![], &step).map_err(serialization)?;
    views.push(("global_step", global_step));

    let metadata: Option<HashMap<String, String>> = None;
    let bytes = safetensors::serialize(views, &metadata).map_err(serialization)?;
    std::fs::write(path, bytes)
        .map_err(|e| ConvertError::io(format!("writing {}", path.display()), e))
}

/// Write a vocabulary of `size` lines, special tokens first.
pub fn write_vocab(path: impl AsRef<Path>, size: usize) -> Result<()> {
    let path = path.as_ref();
    let mut lines: Vec<String> = SPECIAL_TOKENS.iter().map(|(_, t)| (*t).to_string()).collect();
    lines.truncate(size);
    while lines.len() < size {
        lines.push(format!("tok{}", lines.len()));
    }
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .map_err(|e| ConvertError::io(format!("writing {}", path.display()), e))
}

/// Lay out a complete checkpoint directory: variable index and `vocab.txt`.
pub fn write_checkpoint_dir(
    dir: impl AsRef<Path>,
    config: &SourceConfig,
    size: ModelSize,
    seed: u64,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(|e| ConvertError::io(format!("creating {}", dir.display()), e))?;
    write_checkpoint(dir.join(index_file_name(size)), &synthetic_tensors(config, seed))?;
    write_vocab(dir.join("vocab.txt"), config.vocab_size)?;
    Ok(dir.to_path_buf())
}
