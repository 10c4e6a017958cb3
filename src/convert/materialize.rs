//! Direct copy of mapped source tensors into target slots.

use crate::checkpoint::Checkpoint;
use crate::error::{ConvertError, Result};
use crate::mapping::NameMap;
use crate::model::ParamDict;
use crate::tensor::transpose_trailing;
use std::collections::{BTreeMap, BTreeSet};

/// Which names the materializer touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialized {
    /// Target names written
    pub touched: BTreeSet<String>,
    /// Source names read
    pub consumed: BTreeSet<String>,
}

/// Whether a source tensor is a dense kernel stored `[in, out]`.
#[must_use]
pub fn is_kernel(source_name: &str) -> bool {
    source_name.ends_with("kernel")
}

/// Copy every `Param` entry of `map` into `params`.
///
/// Kernels have their two trailing axes swapped. Each target must be declared
/// by the model and written at most once.
pub fn materialize(
    map: &NameMap,
    checkpoint: &Checkpoint,
    params: &ParamDict,
) -> Result<Materialized> {
    let role = map.role();
    let mut writers: BTreeMap<&str, &str> = BTreeMap::new();
    let mut out = Materialized::default();

    for (source, target) in map.params() {
        let slot = params.get(target).ok_or_else(|| ConvertError::UnmappedParameter {
            role,
            source_name: source.to_string(),
            target: target.to_string(),
            reason: "the target model declares no such parameter".into(),
        })?;
        if let Some(previous) = writers.insert(target, source) {
            return Err(ConvertError::UnmappedParameter {
                role,
                source_name: source.to_string(),
                target: target.to_string(),
                reason: format!("already filled from {previous}"),
            });
        }

        let tensor = checkpoint.get(source)?;
        let expected = slot.borrow().shape().to_vec();
        let value = if is_kernel(source) {
            transpose_trailing(tensor).ok_or_else(|| ConvertError::ShapeMismatch {
                name: source.to_string(),
                expected: expected.clone(),
                actual: tensor.shape().to_vec(),
            })?
        } else {
            tensor.clone()
        };
        if value.shape() != expected.as_slice() {
            return Err(ConvertError::ShapeMismatch {
                name: target.to_string(),
                expected,
                actual: value.shape().to_vec(),
            });
        }

        tracing::trace!(%role, source, param = target, shape = ?expected, "copied");
        *slot.borrow_mut() = value;
        out.touched.insert(target.to_string());
        out.consumed.insert(source.to_string());
    }
    Ok(out)
}
