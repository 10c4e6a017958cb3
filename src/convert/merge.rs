//! Fusion of separately stored query/key/value projections into `attn_qkv`.

use crate::checkpoint::Checkpoint;
use crate::error::{ConvertError, Result};
use crate::mapping::ConversionRole;
use crate::model::params::slot;
use crate::model::{layer_prefix, ParamDict};
use ndarray::{concatenate, ArrayD, Axis, Ix1, Ix2};
use std::collections::BTreeSet;

/// Attention projections in the order they are stacked.
pub const PROJECTIONS: [&str; 3] = ["query", "key", "value"];

/// Names produced and consumed by the merger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merged {
    /// Target `attn_qkv` names written
    pub filled: BTreeSet<String>,
    /// Source projection names read
    pub consumed: BTreeSet<String>,
}

/// `{scope}/encoder/layer_{layer}/attention/self`
#[must_use]
pub fn source_prefix(role: ConversionRole, layer: usize) -> String {
    format!("{}/encoder/layer_{layer}/attention/self", role.source_scope())
}

fn fetch<'a>(
    checkpoint: &'a Checkpoint,
    role: ConversionRole,
    layer: usize,
    name: String,
) -> Result<(String, &'a ArrayD<f32>)> {
    if !checkpoint.contains(&name) {
        return Err(ConvertError::MissingProjection { role, layer, name });
    }
    let tensor = checkpoint.get(&name)?;
    Ok((name, tensor))
}

fn store(params: &ParamDict, name: &str, value: ArrayD<f32>) -> Result<()> {
    let target = slot(params, name)?;
    let expected = target.borrow().shape().to_vec();
    if value.shape() != expected.as_slice() {
        return Err(ConvertError::ShapeMismatch {
            name: name.to_string(),
            expected,
            actual: value.shape().to_vec(),
        });
    }
    *target.borrow_mut() = value;
    Ok(())
}

/// Fill `{prefix}encoder.all_encoder_layers.{i}.attn_qkv.{weight,bias}` for
/// every layer from the role's query, key and value tensors.
///
/// The weight is the transpose of the kernels stacked along their output
/// axis; the bias is the three biases laid end to end.
pub fn merge_fused_projections(
    role: ConversionRole,
    checkpoint: &Checkpoint,
    params: &ParamDict,
    num_layers: usize,
    backbone_prefix: &str,
) -> Result<Merged> {
    let mut merged = Merged::default();

    for layer in 0..num_layers {
        let src = source_prefix(role, layer);
        let dst = format!("{backbone_prefix}{}.attn_qkv", layer_prefix(layer));

        let mut kernels = Vec::with_capacity(PROJECTIONS.len());
        let mut biases = Vec::with_capacity(PROJECTIONS.len());
        for proj in PROJECTIONS {
            let (name, kernel) = fetch(checkpoint, role, layer, format!("{src}/{proj}/kernel"))?;
            let kernel = kernel
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|_| ConvertError::ShapeMismatch {
                    name: name.clone(),
                    expected: vec![0, 0],
                    actual: kernel.shape().to_vec(),
                })?;
            kernels.push(kernel);
            merged.consumed.insert(name);

            let (name, bias) = fetch(checkpoint, role, layer, format!("{src}/{proj}/bias"))?;
            let bias = bias
                .view()
                .into_dimensionality::<Ix1>()
                .map_err(|_| ConvertError::ShapeMismatch {
                    name: name.clone(),
                    expected: vec![0],
                    actual: bias.shape().to_vec(),
                })?;
            biases.push(bias);
            merged.consumed.insert(name);
        }

        let stacked = concatenate(Axis(1), &kernels).map_err(|e| ConvertError::ShapeMismatch {
            name: format!("{src}/{{query,key,value}}/kernel ({e})"),
            expected: kernels.first().map(|k| k.shape().to_vec()).unwrap_or_default(),
            actual: kernels.iter().flat_map(|k| k.shape().to_vec()).collect(),
        })?;
        let weight = stacked.t().as_standard_layout().into_owned().into_dyn();
        let bias = concatenate(Axis(0), &biases)
            .map_err(|e| ConvertError::ShapeMismatch {
                name: format!("{src}/{{query,key,value}}/bias ({e})"),
                expected: biases.first().map(|b| b.shape().to_vec()).unwrap_or_default(),
                actual: biases.iter().flat_map(|b| b.shape().to_vec()).collect(),
            })?
            .into_dyn();

        let weight_name = format!("{dst}.weight");
        let bias_name = format!("{dst}.bias");
        store(params, &weight_name, weight)?;
        store(params, &bias_name, bias)?;
        tracing::trace!(%role, layer, param = %dst, "fused query/key/value");
        merged.filled.insert(weight_name);
        merged.filled.insert(bias_name);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::new_slot;
    use ndarray::{arr1, arr2};

    fn layer0(role_scope: &str) -> Checkpoint {
        let mut tensors = Vec::new();
        for (i, proj) in PROJECTIONS.iter().enumerate() {
            let base = i as f32 * 10.0;
            tensors.push((
                format!("{role_scope}/encoder/layer_0/attention/self/{proj}/kernel"),
                arr2(&[[base, base + 1.0], [base + 2.0, base + 3.0]]).into_dyn(),
            ));
            tensors.push((
                format!("{role_scope}/encoder/layer_0/attention/self/{proj}/bias"),
                arr1(&[base, base + 1.0]).into_dyn(),
            ));
        }
        Checkpoint::from_tensors(tensors)
    }

    fn slots(prefix: &str) -> ParamDict {
        let mut params = ParamDict::new();
        params.insert(
            format!("{prefix}encoder.all_encoder_layers.0.attn_qkv.weight"),
            new_slot(&[6, 2]),
        );
        params.insert(
            format!("{prefix}encoder.all_encoder_layers.0.attn_qkv.bias"),
            new_slot(&[6]),
        );
        params
    }

    #[test]
    fn test_merge_stacks_then_transposes() {
        let ckpt = layer0("electra");
        let params = slots("");
        let merged =
            merge_fused_projections(ConversionRole::Backbone, &ckpt, &params, 1, "").unwrap();
        assert_eq!(merged.filled.len(), 2);
        assert_eq!(merged.consumed.len(), 6);

        let w = params["encoder.all_encoder_layers.0.attn_qkv.weight"].borrow();
        // row r of the weight is column r of [q | k | v]
        assert_eq!(w[[0, 0]], 0.0);
        assert_eq!(w[[0, 1]], 2.0);
        assert_eq!(w[[1, 1]], 3.0);
        assert_eq!(w[[2, 0]], 10.0);
        assert_eq!(w[[5, 1]], 23.0);

        let b = params["encoder.all_encoder_layers.0.attn_qkv.bias"].borrow();
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]);
    }

    #[test]
    fn test_generator_reads_generator_scope() {
        let ckpt = layer0("generator");
        let params = slots("backbone_model.");
        let merged = merge_fused_projections(
            ConversionRole::Generator,
            &ckpt,
            &params,
            1,
            "backbone_model.",
        )
        .unwrap();
        assert!(merged
            .filled
            .contains("backbone_model.encoder.all_encoder_layers.0.attn_qkv.weight"));
    }

    #[test]
    fn test_missing_projection_names_layer() {
        let ckpt = layer0("electra");
        let mut params = slots("backbone_model.");
        params.insert(
            "backbone_model.encoder.all_encoder_layers.1.attn_qkv.weight".into(),
            new_slot(&[6, 2]),
        );
        let err = merge_fused_projections(
            ConversionRole::Discriminator,
            &ckpt,
            &params,
            2,
            "backbone_model.",
        )
        .unwrap_err();
        match err {
            ConvertError::MissingProjection { role, layer, name } => {
                assert_eq!(role, ConversionRole::Discriminator);
                assert_eq!(layer, 1);
                assert_eq!(name, "electra/encoder/layer_1/attention/self/query/kernel");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shape_mismatch_against_slot() {
        let ckpt = layer0("electra");
        let mut params = slots("");
        params.insert(
            "encoder.all_encoder_layers.0.attn_qkv.weight".into(),
            new_slot(&[2, 6]),
        );
        let err =
            merge_fused_projections(ConversionRole::Backbone, &ckpt, &params, 1, "").unwrap_err();
        assert_eq!(err.code(), "E020");
    }

    #[test]
    fn test_rank_one_kernel_rejected() {
        let full = layer0("electra");
        let tensors = full.names().into_iter().map(|n| {
            let t = if n.ends_with("query/kernel") {
                ArrayD::zeros(vec![4])
            } else {
                full.get(&n).unwrap().clone()
            };
            (n, t)
        });
        let ckpt = Checkpoint::from_tensors(tensors);
        let err = merge_fused_projections(ConversionRole::Backbone, &ckpt, &slots(""), 1, "")
            .unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { .. }));
    }
}
