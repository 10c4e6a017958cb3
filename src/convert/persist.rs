//! Writing converted parameters and text artifacts.

use crate::error::{ConvertError, Result};
use crate::mapping::ConversionRole;
use crate::model::params::{deduplicate, shared_groups};
use crate::model::ParamDict;
use crate::tensor::{decode_view, to_le_bytes};
use ndarray::ArrayD;
use safetensors::tensor::{Dtype, TensorView};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Save `params` as F32 SafeTensors. Names sharing a slot are written once,
/// under the lexicographically first name. Returns the number of tensors written.
pub fn save_parameters(
    path: impl AsRef<Path>,
    params: &ParamDict,
    role: ConversionRole,
) -> Result<usize> {
    let path = path.as_ref();
    let kept = deduplicate(params);
    for group in shared_groups(params) {
        tracing::debug!(
            %role,
            kept = %group[0],
            aliases = ?&group[1..],
            "writing shared parameter once"
        );
    }

    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = kept
        .iter()
        .map(|(name, slot)| {
            let value = slot.borrow();
            (name.as_str(), to_le_bytes(&value), value.shape().to_vec())
        })
        .collect();

    let serialization = |e: safetensors::SafeTensorError| ConvertError::Serialization {
        message: format!("encoding {}: {e}", path.display()),
    };
    let mut views = Vec::with_capacity(tensor_data.len());
    for (name, bytes, shape) in &tensor_data {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes).map_err(serialization)?;
        views.push((*name, view));
    }

    let mut metadata = HashMap::new();
    metadata.insert("format".to_string(), "convertir".to_string());
    metadata.insert("role".to_string(), role.to_string());

    let bytes = safetensors::serialize(views, &Some(metadata)).map_err(serialization)?;
    std::fs::write(path, bytes)
        .map_err(|e| ConvertError::io(format!("writing {}", path.display()), e))?;
    Ok(tensor_data.len())
}

/// Read back a parameter file written by [`save_parameters`].
pub fn load_parameters(path: impl AsRef<Path>) -> Result<BTreeMap<String, ArrayD<f32>>> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| ConvertError::io(format!("reading {}", path.display()), e))?;
    let file =
        safetensors::SafeTensors::deserialize(&data).map_err(|e| ConvertError::Serialization {
            message: format!("decoding {}: {e}", path.display()),
        })?;

    let mut tensors = BTreeMap::new();
    for (name, view) in file.tensors() {
        let tensor = decode_view(&view).map_err(|message| ConvertError::Serialization {
            message: format!("decoding {name} in {}: {message}", path.display()),
        })?;
        tensors.insert(name, tensor);
    }
    Ok(tensors)
}

/// Write a UTF-8 text artifact.
pub fn write_text(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, content)
        .map_err(|e| ConvertError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::new_slot;
    use approx::assert_abs_diff_eq;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.safetensors");

        let mut params = ParamDict::new();
        let w = new_slot(&[2, 3]);
        w.borrow_mut()[[1, 2]] = 1.5;
        params.insert("word_embed.weight".into(), w);
        params.insert("embed_layer_norm.gamma".into(), new_slot(&[3]));

        assert_eq!(save_parameters(&path, &params, ConversionRole::Backbone).unwrap(), 2);
        let loaded = load_parameters(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["word_embed.weight"].shape(), &[2, 3]);
        assert_abs_diff_eq!(loaded["word_embed.weight"][[1, 2]], 1.5);
    }

    #[test]
    fn test_shared_slots_written_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gen_model.safetensors");

        let shared = new_slot(&[4, 2]);
        let mut params = ParamDict::new();
        params.insert("mlm_decoder.3.weight".into(), Rc::clone(&shared));
        params.insert("backbone_model.word_embed.weight".into(), shared);
        params.insert("mlm_decoder.3.bias".into(), new_slot(&[4]));

        assert_eq!(save_parameters(&path, &params, ConversionRole::Generator).unwrap(), 2);
        let loaded = load_parameters(&path).unwrap();
        assert!(loaded.contains_key("backbone_model.word_embed.weight"));
        assert!(!loaded.contains_key("mlm_decoder.3.weight"));

        let data = std::fs::read(&path).unwrap();
        let (_, meta) = safetensors::SafeTensors::read_metadata(&data).unwrap();
        let meta = meta.metadata().clone().unwrap();
        assert_eq!(meta["role"], "gen");
    }

    #[test]
    fn test_load_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.safetensors");
        write_text(&path, "not a tensor file").unwrap();
        assert_eq!(load_parameters(&path).unwrap_err().code(), "E051");
    }
}
