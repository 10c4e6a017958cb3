//! Dense `f32` tensor helpers shared by the reader, the models and the writer.

use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

/// Decode a SafeTensors view into an owned `f32` array.
///
/// F32, F16, BF16 and F64 are accepted; any other dtype is reported back as
/// a message for the caller to wrap with its own context.
pub fn decode_view(view: &TensorView<'_>) -> std::result::Result<ArrayD<f32>, String> {
    let bytes = view.data();
    let values: Vec<f32> = match view.dtype() {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                f64::from_le_bytes(raw) as f32
            })
            .collect(),
        other => return Err(format!("unsupported tensor dtype {other:?}")),
    };

    ArrayD::from_shape_vec(IxDyn(view.shape()), values)
        .map_err(|e| format!("tensor data does not match shape {:?}: {e}", view.shape()))
}

/// Swap the two trailing axes. Returns `None` for tensors of rank < 2.
///
/// The result is in standard layout so it can be written out directly.
#[must_use]
pub fn transpose_trailing(tensor: &ArrayD<f32>) -> Option<ArrayD<f32>> {
    let rank = tensor.ndim();
    if rank < 2 {
        return None;
    }
    let mut view = tensor.view();
    view.swap_axes(rank - 2, rank - 1);
    Some(view.as_standard_layout().into_owned())
}

/// Little-endian F32 bytes of a tensor in logical (row-major) order.
#[must_use]
pub fn to_le_bytes(tensor: &ArrayD<f32>) -> Vec<u8> {
    let values: Vec<f32> = tensor.iter().copied().collect();
    bytemuck::cast_slice(&values).to_vec()
}

/// Largest amount by which `|actual - expected| <= atol + rtol * |expected|`
/// is violated, or 0.0 when every element is within tolerance.
///
/// Shapes must already agree; NaN on either side counts as infinite excess.
#[must_use]
pub fn tolerance_excess<'a, I>(actual: I, expected: I, rtol: f32, atol: f32) -> (f32, f32)
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut worst_excess = 0.0_f32;
    let mut max_abs_diff = 0.0_f32;
    for (a, b) in actual.into_iter().zip(expected) {
        let diff = (a - b).abs();
        if diff.is_nan() {
            return (f32::INFINITY, f32::INFINITY);
        }
        max_abs_diff = max_abs_diff.max(diff);
        worst_excess = worst_excess.max(diff - (atol + rtol * b.abs()));
    }
    (worst_excess, max_abs_diff)
}
