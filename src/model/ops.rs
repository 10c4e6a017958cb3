//! Numeric building blocks for the forward passes.

use crate::error::{ConvertError, Result};
use ndarray::{s, Array1, Array2, ArrayD, Axis, Ix1, Ix2};

/// Additive bias the TF reference adds to masked attention scores.
pub const TF_MASK_BIAS: f32 = -10000.0;

/// Elementwise activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Exact GELU, `x * Φ(x)`
    GeluErf,
    /// Tanh approximation of GELU
    GeluTanh,
    Relu,
    Tanh,
}

impl std::str::FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gelu" | "gelu(erf)" => Ok(Activation::GeluErf),
            "gelu(tanh)" | "gelu_new" | "gelu_tanh" => Ok(Activation::GeluTanh),
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            _ => Err(format!(
                "Unknown activation: {s}. Valid activations: gelu, gelu(tanh), relu, tanh"
            )),
        }
    }
}

impl Activation {
    /// Interpret a TF BERT `hidden_act`, whose `gelu` is the tanh approximation.
    pub fn from_tf_name(name: &str) -> std::result::Result<Self, String> {
        match name.to_lowercase().as_str() {
            "gelu" => Ok(Activation::GeluTanh),
            other => other.parse(),
        }
    }

    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::GeluErf => 0.5 * x * (1.0 + erf(x / std::f32::consts::SQRT_2)),
            Activation::GeluTanh => {
                let c = (2.0 / std::f32::consts::PI).sqrt();
                0.5 * x * (1.0 + (c * (x + 0.044_715 * x * x * x)).tanh())
            }
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
        }
    }

    pub fn apply_inplace(self, x: &mut Array2<f32>) {
        x.mapv_inplace(|v| self.apply(v));
    }
}

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
#[must_use]
pub fn erf(x: f32) -> f32 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = f64::from(x.abs());
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let inner = -1.453_152_027 + t * 1.061_405_429;
    let poly = t * (0.254_829_592 + t * (-0.284_496_736 + t * (1.421_413_741 + t * inner)));
    sign * (1.0 - poly * (-x * x).exp()) as f32
}

/// View a parameter as a matrix.
pub fn as_matrix(name: &str, tensor: &ArrayD<f32>) -> Result<Array2<f32>> {
    tensor
        .clone()
        .into_dimensionality::<Ix2>()
        .map_err(|_| ConvertError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![0, 0],
            actual: tensor.shape().to_vec(),
        })
}

/// View a parameter as a vector.
pub fn as_vector(name: &str, tensor: &ArrayD<f32>) -> Result<Array1<f32>> {
    tensor
        .clone()
        .into_dimensionality::<Ix1>()
        .map_err(|_| ConvertError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![0],
            actual: tensor.shape().to_vec(),
        })
}

/// `x · wᵀ + b` with `w` stored `[out, in]`.
#[must_use]
pub fn dense(x: &Array2<f32>, weight: &Array2<f32>, bias: &Array1<f32>) -> Array2<f32> {
    x.dot(&weight.t()) + bias
}

/// `x · k + b` with `k` stored `[in, out]`.
#[must_use]
pub fn affine(x: &Array2<f32>, kernel: &Array2<f32>, bias: &Array1<f32>) -> Array2<f32> {
    x.dot(kernel) + bias
}

/// Row-wise layer normalization.
#[must_use]
pub fn layer_norm(
    x: &Array2<f32>,
    gamma: &Array1<f32>,
    beta: &Array1<f32>,
    eps: f32,
) -> Array2<f32> {
    let mut out = x.clone();
    for mut row in out.rows_mut() {
        let n = row.len() as f32;
        let mean = row.sum() / n;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let inv = 1.0 / (var + eps).sqrt();
        for ((v, g), b) in row.iter_mut().zip(gamma).zip(beta) {
            *v = (*v - mean) * inv * g + b;
        }
    }
    out
}

/// Rows of `table` at `ids`.
pub fn gather_rows(name: &str, table: &Array2<f32>, ids: &[usize]) -> Result<Array2<f32>> {
    if let Some(bad) = ids.iter().find(|&&id| id >= table.nrows()) {
        return Err(ConvertError::InvalidInput {
            message: format!("index {bad} out of range for {name} with {} rows", table.nrows()),
        });
    }
    Ok(table.select(Axis(0), ids))
}

fn softmax_prefix(row: &mut ndarray::ArrayViewMut1<'_, f32>, len: usize) {
    let max = row.slice(s![..len]).fold(f32::NEG_INFINITY, |m, v| m.max(*v));
    let mut sum = 0.0;
    for v in row.slice_mut(s![..len]).iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.slice_mut(s![..len]).iter_mut() {
        *v /= sum;
    }
    row.slice_mut(s![len..]).fill(0.0);
}

/// Softmax over keys `j < valid`; rows `i >= valid` become all zeros.
pub fn masked_softmax(scores: &mut Array2<f32>, valid: usize) {
    for (i, mut row) in scores.rows_mut().into_iter().enumerate() {
        if i >= valid || valid == 0 {
            row.fill(0.0);
        } else {
            let len = valid.min(row.len());
            softmax_prefix(&mut row, len);
        }
    }
}

/// Softmax after adding [`TF_MASK_BIAS`] to keys `j >= valid`, for every row.
pub fn additive_masked_softmax(scores: &mut Array2<f32>, valid: usize) {
    for mut row in scores.rows_mut() {
        let len = row.len();
        for v in row.slice_mut(s![valid.min(len)..]).iter_mut() {
            *v += TF_MASK_BIAS;
        }
        softmax_prefix(&mut row, len);
    }
}

/// Multi-head scaled dot-product attention over `[seq, units]` projections.
pub fn multi_head_attention(
    q: &Array2<f32>,
    k: &Array2<f32>,
    v: &Array2<f32>,
    num_heads: usize,
    softmax: impl Fn(&mut Array2<f32>),
) -> Array2<f32> {
    let units = q.ncols();
    let head_dim = units / num_heads;
    let scale = 1.0 / (head_dim as f32).sqrt();
    let mut context = Array2::<f32>::zeros((q.nrows(), units));
    for h in 0..num_heads {
        let cols = s![.., h * head_dim..(h + 1) * head_dim];
        let mut scores = q.slice(cols).dot(&k.slice(cols).t()) * scale;
        softmax(&mut scores);
        context.slice_mut(cols).assign(&scores.dot(&v.slice(cols)));
    }
    context
}
