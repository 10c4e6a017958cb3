//! Forward-pass inputs and outputs.

use crate::error::{ConvertError, Result};
use ndarray::{Array1, Array2, Array3, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A batch of token sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBatch {
    /// `[batch, seq]` token ids
    pub token_ids: Array2<usize>,
    /// `[batch, seq]` segment ids
    pub token_types: Array2<usize>,
    /// Number of non-padding positions per sequence
    pub valid_length: Array1<usize>,
    /// `[batch, num_mask]` positions scored by the masked-LM head
    pub masked_positions: Array2<usize>,
}

impl InputBatch {
    /// Seeded random batch.
    ///
    /// Token ids are uniform in `[0, vocab_size)`, valid lengths in
    /// `[seq_len / 2, seq_len)`, segment ids in `{0, 1}` (clamped to the
    /// available token types) and masked positions in `[0, seq_len / 2)`.
    /// Needs at least two positions and a non-empty vocabulary.
    pub fn random(
        vocab_size: usize,
        num_token_types: usize,
        batch_size: usize,
        seq_len: usize,
        num_mask: usize,
        seed: u64,
    ) -> Result<Self> {
        if seq_len < 2 {
            return Err(ConvertError::InvalidInput {
                message: format!("random inputs need seq_len >= 2, got {seq_len}"),
            });
        }
        if vocab_size == 0 {
            return Err(ConvertError::InvalidInput {
                message: "random inputs need a non-empty vocabulary".into(),
            });
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let half = (seq_len / 2).max(1);
        let types = num_token_types.clamp(1, 2);

        let token_ids =
            Array2::from_shape_simple_fn((batch_size, seq_len), || rng.random_range(0..vocab_size));
        let valid_length = Array1::from_shape_simple_fn(batch_size, || {
            rng.random_range(half.min(seq_len - 1)..seq_len)
        });
        let token_types =
            Array2::from_shape_simple_fn((batch_size, seq_len), || rng.random_range(0..types));
        let masked_positions =
            Array2::from_shape_simple_fn((batch_size, num_mask), || rng.random_range(0..half));

        Ok(Self {
            token_ids,
            token_types,
            valid_length,
            masked_positions,
        })
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.token_ids.nrows()
    }

    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.token_ids.ncols()
    }

    /// Check ids against the model's table sizes.
    pub fn validate(
        &self,
        vocab_size: usize,
        num_token_types: usize,
        max_length: usize,
    ) -> Result<()> {
        let invalid = |message: String| Err(ConvertError::InvalidInput { message });

        if self.token_types.dim() != self.token_ids.dim() {
            return invalid(format!(
                "token types {:?} do not match token ids {:?}",
                self.token_types.dim(),
                self.token_ids.dim()
            ));
        }
        if self.valid_length.len() != self.batch_size()
            || self.masked_positions.nrows() != self.batch_size()
        {
            return invalid("valid_length and masked_positions need one row per sequence".into());
        }
        if self.seq_len() > max_length {
            return invalid(format!(
                "sequence length {} exceeds max_length {max_length}",
                self.seq_len()
            ));
        }
        if let Some(id) = self.token_ids.iter().find(|&&id| id >= vocab_size) {
            return invalid(format!("token id {id} outside vocabulary of {vocab_size}"));
        }
        if let Some(t) = self.token_types.iter().find(|&&t| t >= num_token_types) {
            return invalid(format!("token type {t} outside {num_token_types} types"));
        }
        if let Some(v) = self.valid_length.iter().find(|&&v| v > self.seq_len()) {
            return invalid(format!("valid length {v} exceeds sequence length {}", self.seq_len()));
        }
        if let Some(p) = self.masked_positions.iter().find(|&&p| p >= self.seq_len()) {
            return invalid(format!("masked position {p} outside sequence"));
        }
        Ok(())
    }
}

/// Outputs of a forward pass.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// `[batch, seq, units]`
    pub contextual: Array3<f32>,
    /// `[batch, units]`, the first position of each sequence
    pub pooled: Array2<f32>,
    /// Head scores: `[batch, seq]` for the discriminator,
    /// `[batch, num_mask, vocab]` for the generator
    pub scores: Option<ArrayD<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_batch_ranges() {
        let batch = InputBatch::random(50, 2, 3, 32, 5, 1234).unwrap();
        assert_eq!(batch.token_ids.dim(), (3, 32));
        assert_eq!(batch.masked_positions.dim(), (3, 5));
        assert!(batch.token_ids.iter().all(|&t| t < 50));
        assert!(batch.token_types.iter().all(|&t| t < 2));
        assert!(batch.valid_length.iter().all(|&v| (16..32).contains(&v)));
        assert!(batch.masked_positions.iter().all(|&p| p < 16));
        assert!(batch.validate(50, 2, 32).is_ok());
    }

    #[test]
    fn test_random_batch_is_seeded() {
        let a = InputBatch::random(50, 2, 3, 16, 5, 7).unwrap();
        let b = InputBatch::random(50, 2, 3, 16, 5, 7).unwrap();
        let c = InputBatch::random(50, 2, 3, 16, 5, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let batch = InputBatch::random(50, 2, 2, 16, 3, 1).unwrap();
        assert!(batch.validate(10, 2, 16).is_err());
        assert!(batch.validate(50, 2, 8).is_err());

        let mut bad = batch.clone();
        bad.valid_length[0] = 17;
        assert!(bad.validate(50, 2, 16).is_err());
    }

    #[test]
    fn test_random_batch_needs_two_positions() {
        for seq_len in [0, 1] {
            let err = InputBatch::random(50, 2, 2, seq_len, 1, 3).unwrap_err();
            assert_eq!(err.code(), "E041");
        }
        assert!(InputBatch::random(0, 2, 2, 8, 1, 3).is_err());
        let batch = InputBatch::random(50, 2, 2, 2, 1, 3).unwrap();
        assert!(batch.valid_length.iter().all(|&v| v == 1));
    }
}
