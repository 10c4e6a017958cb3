//! Numerical equivalence between the source reference and a converted backbone.

use crate::checkpoint::Checkpoint;
use crate::config::{CheckSection, SourceConfig};
use crate::error::{ConvertError, Result};
use crate::model::{ElectraModel, InputBatch, TargetModel};
use crate::source::TfElectraReference;
use crate::tensor::tolerance_excess;
use ndarray::{s, Axis};
use serde::Serialize;

/// Input generation and tolerances for one check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalenceSettings {
    pub batch_size: usize,
    pub seq_length: usize,
    pub num_mask: usize,
    pub seed: u64,
    pub rtol: f32,
    pub atol: f32,
}

impl Default for EquivalenceSettings {
    fn default() -> Self {
        Self::from(&CheckSection::default())
    }
}

impl From<&CheckSection> for EquivalenceSettings {
    fn from(check: &CheckSection) -> Self {
        Self {
            batch_size: check.batch_size,
            seq_length: check.seq_length,
            num_mask: check.num_mask,
            seed: check.seed,
            rtol: check.rtol,
            atol: check.atol,
        }
    }
}

/// Largest absolute deviations observed in a passing check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquivalenceReport {
    pub pooled_max_abs_diff: f32,
    pub contextual_max_abs_diff: f32,
    pub batch_size: usize,
    pub seq_length: usize,
}

fn failure(
    output: impl Into<String>,
    max_abs_diff: f32,
    settings: &EquivalenceSettings,
) -> ConvertError {
    ConvertError::EquivalenceCheckFailed {
        output: output.into(),
        max_abs_diff,
        rtol: settings.rtol,
        atol: settings.atol,
    }
}

/// Run the source reference and `model` on the same seeded batch and compare
/// the pooled output and every sequence's non-padded contextual span.
pub fn check_equivalence(
    checkpoint: &Checkpoint,
    source: &SourceConfig,
    model: &ElectraModel,
    settings: &EquivalenceSettings,
) -> Result<EquivalenceReport> {
    let inputs = InputBatch::random(
        source.vocab_size,
        source.type_vocab_size,
        settings.batch_size,
        settings.seq_length,
        settings.num_mask,
        settings.seed,
    )?;
    tracing::debug!(
        batch = settings.batch_size,
        seq = settings.seq_length,
        seed = settings.seed,
        "running equivalence check"
    );

    let expected = TfElectraReference::new(checkpoint, source)?.forward(&inputs)?;
    let actual = model.forward(&inputs)?;

    if actual.pooled.dim() != expected.pooled.dim() {
        return Err(ConvertError::ShapeMismatch {
            name: "pooled output".into(),
            expected: expected.pooled.shape().to_vec(),
            actual: actual.pooled.shape().to_vec(),
        });
    }
    if actual.contextual.dim() != expected.contextual.dim() {
        return Err(ConvertError::ShapeMismatch {
            name: "contextual output".into(),
            expected: expected.contextual.shape().to_vec(),
            actual: actual.contextual.shape().to_vec(),
        });
    }

    let (excess, pooled_diff) = tolerance_excess(
        actual.pooled.iter(),
        expected.pooled.iter(),
        settings.rtol,
        settings.atol,
    );
    if excess > 0.0 {
        return Err(failure("pooled output", pooled_diff, settings));
    }

    let mut contextual_diff = 0.0_f32;
    for (b, &valid) in inputs.valid_length.iter().enumerate() {
        let a = actual.contextual.index_axis(Axis(0), b);
        let e = expected.contextual.index_axis(Axis(0), b);
        let (excess, diff) = tolerance_excess(
            a.slice(s![..valid, ..]).iter(),
            e.slice(s![..valid, ..]).iter(),
            settings.rtol,
            settings.atol,
        );
        if excess > 0.0 {
            return Err(failure(format!("contextual output of sequence {b}"), diff, settings));
        }
        contextual_diff = contextual_diff.max(diff);
    }

    let report = EquivalenceReport {
        pooled_max_abs_diff: pooled_diff,
        contextual_max_abs_diff: contextual_diff,
        batch_size: settings.batch_size,
        seq_length: settings.seq_length,
    };
    tracing::info!(
        pooled_max_abs_diff = report.pooled_max_abs_diff,
        contextual_max_abs_diff = report.contextual_max_abs_diff,
        "equivalence check passed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::translate;
    use crate::fixtures::{synthetic_checkpoint, tiny_source_config};

    #[test]
    fn test_unconverted_model_fails() {
        let source = tiny_source_config();
        let ckpt = synthetic_checkpoint(&source, 2);
        let model = ElectraModel::new(&translate(&source, 50).unwrap()).unwrap();
        let settings = EquivalenceSettings {
            seq_length: 8,
            ..EquivalenceSettings::default()
        };
        // zero-filled slots produce layer-norm outputs of pure beta (zero)
        let err = check_equivalence(&ckpt, &source, &model, &settings).unwrap_err();
        assert!(matches!(err, ConvertError::EquivalenceCheckFailed { .. }));
        assert_eq!(err.code(), "E040");
    }

    #[test]
    fn test_width_disagreement_is_shape_mismatch() {
        let source = tiny_source_config();
        let ckpt = synthetic_checkpoint(&source, 2);
        let mut target = translate(&source, 50).unwrap();
        target.model.units = 4;
        target.model.num_heads = 1;
        target.model.hidden_size = 16;
        let model = ElectraModel::new(&target).unwrap();
        let err = check_equivalence(&ckpt, &source, &model, &EquivalenceSettings::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_single_position_inputs_are_rejected() {
        let source = tiny_source_config();
        let ckpt = synthetic_checkpoint(&source, 2);
        let model = ElectraModel::new(&translate(&source, 50).unwrap()).unwrap();
        let settings = EquivalenceSettings {
            seq_length: 1,
            ..EquivalenceSettings::default()
        };
        let err = check_equivalence(&ckpt, &source, &model, &settings).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput { .. }), "{err}");
    }

    #[test]
    fn test_settings_from_check_section() {
        let check = CheckSection {
            seed: 7,
            ..CheckSection::default()
        };
        let settings = EquivalenceSettings::from(&check);
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.seq_length, 32);
        assert_eq!(settings.num_mask, 5);
    }
}
